#[cfg(feature = "napi")]
use napi_derive::napi;
use serde::{Deserialize, Serialize};
use std::fmt;

use oxc_allocator::Allocator;
use oxc_parser::Parser;
use oxc_span::SourceType;

// ═══════════════════════════════════════════════════════════════════════════════
// DIAGNOSTIC CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const L2J_PARSE_001: &str = "L2J-PARSE-001";
pub const L2J_GEN_001: &str = "L2J-GEN-001";
pub const L2J_FORMAT_001: &str = "L2J-FORMAT-001";
pub const L2J_IO_001: &str = "L2J-IO-001";

// ═══════════════════════════════════════════════════════════════════════════════
// GUARANTEES
// ═══════════════════════════════════════════════════════════════════════════════

fn get_guarantee(code: &str) -> &'static str {
    match code {
        L2J_PARSE_001 => "Only syntactically valid Lua 5.3 is translated.",
        L2J_GEN_001 => {
            "Unsupported constructs are contained to their node; the rest of the file is still translated."
        }
        L2J_FORMAT_001 => "Formatted output is produced only from parseable JavaScript.",
        L2J_IO_001 => "Every discovered source file is either translated or reported.",
        _ => "Unknown diagnostic.",
    }
}

fn get_error_type(code: &str) -> &'static str {
    match code {
        L2J_GEN_001 => "UNSUPPORTED_CONSTRUCT",
        L2J_IO_001 => "IO_ERROR",
        _ => "SYNTAX_ERROR",
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILER ERROR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct CompilerError {
    pub code: String,
    pub error_type: String,
    pub message: String,
    pub guarantee: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub context: Option<String>,
    pub hints: Vec<String>,
}

impl CompilerError {
    pub fn new(code: &str, message: &str, file: &str, line: u32, column: u32) -> Self {
        Self::with_details(code, message, file, line, column, None, vec![])
    }

    pub fn with_details(
        code: &str,
        message: &str,
        file: &str,
        line: u32,
        column: u32,
        context: Option<String>,
        hints: Vec<String>,
    ) -> Self {
        CompilerError {
            code: code.to_string(),
            error_type: get_error_type(code).to_string(),
            message: message.to_string(),
            guarantee: get_guarantee(code).to_string(),
            file: file.to_string(),
            line,
            column,
            context,
            hints,
        }
    }
}

impl fmt::Display for CompilerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}:{}:{} {}",
            self.code, self.file, self.line, self.column, self.message
        )
    }
}

impl std::error::Error for CompilerError {}

// ═══════════════════════════════════════════════════════════════════════════════
// OUTPUT VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Parses generated JS as an ES module; returns the first parse error.
pub fn check_js_syntax(code: &str) -> Result<(), String> {
    let allocator = Allocator::default();
    let source_type = SourceType::default().with_module(true);
    let ret = Parser::new(&allocator, code, source_type).parse();

    match ret.errors.first() {
        Some(error) => Err(error.to_string()),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compiler_error_carries_guarantee() {
        let error = CompilerError::new(L2J_GEN_001, "Unsupported goto target: done", "a.lua", 3, 4);
        assert_eq!(error.error_type, "UNSUPPORTED_CONSTRUCT");
        assert!(error.guarantee.contains("contained"));
        assert_eq!(
            error.to_string(),
            "L2J-GEN-001 a.lua:3:4 Unsupported goto target: done"
        );
        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["errorType"], "UNSUPPORTED_CONSTRUCT");
    }

    #[test]
    fn test_check_js_syntax() {
        assert!(check_js_syntax("let a = 1;\nexport default a;").is_ok());
        assert!(check_js_syntax("let = ;").is_err());
    }
}
