//! Finalize Module for the Lua translator
//!
//! Output post-processing: pretty-printing through oxc and the error-block
//! form used when a file's translation is not clean.

use oxc_allocator::Allocator;
use oxc_codegen::Codegen;
use oxc_parser::Parser;
use oxc_span::SourceType;

use crate::validate::{CompilerError, L2J_FORMAT_001};

/// Re-prints generated JS. Fails when the text does not parse as a module.
pub fn format_js(code: &str, file: &str) -> Result<String, CompilerError> {
    let allocator = Allocator::default();
    let source_type = SourceType::default().with_module(true);
    let ret = Parser::new(&allocator, code, source_type).parse();

    if let Some(error) = ret.errors.first() {
        return Err(CompilerError::with_details(
            L2J_FORMAT_001,
            &error.to_string(),
            file,
            0,
            0,
            None,
            vec!["The unformatted output is kept below the error block.".to_string()],
        ));
    }

    Ok(Codegen::new().build(&ret.program).code)
}

/// Prefixes `js` with a block comment listing `errors`.
pub fn annotate_with_error(errors: &[String], js: &str) -> String {
    let text = errors.join("\n").replace("*/", "* /");
    format!("/*\n{}\n*/\n{}", text, js)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::check_js_syntax;

    #[test]
    fn test_format_reprints_valid_module() {
        let formatted = format_js("let a=1;;export default a", "a.lua").unwrap();
        assert!(formatted.contains("let a = 1;"));
        assert!(formatted.contains("export default a;"));
    }

    #[test]
    fn test_format_rejects_invalid_output() {
        let error = format_js("let = ;", "broken.lua").unwrap_err();
        assert_eq!(error.code, L2J_FORMAT_001);
        assert_eq!(error.file, "broken.lua");
    }

    #[test]
    fn test_error_block_stays_a_comment() {
        let annotated = annotate_with_error(&["bad */ thing".to_string()], "let a = 1");
        assert!(annotated.starts_with("/*\nbad * / thing\n*/\n"));
        assert!(check_js_syntax(&annotated).is_ok());
    }
}
