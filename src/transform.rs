//! Transform Module for the Lua translator
//!
//! Entry point translating one Lua source file into one JS module:
//! parse with scope tracking, record globals, generate, optionally format,
//! and fold every diagnostic into the output-shaped result.

#[cfg(feature = "napi")]
use napi_derive::napi;
use serde::{Deserialize, Serialize};

use crate::codegen::Generator;
use crate::finalize::{annotate_with_error, format_js};
use crate::parse::{parse_chunk, NoHooks};
use crate::registry::{OperatorModeConfig, Registries};
use crate::scope::{ScopeTracker, LUA_GLOBAL_LIB};
use crate::validate::{CompilerError, L2J_GEN_001, L2J_PARSE_001};

// ═══════════════════════════════════════════════════════════════════════════════
// OPTIONS & OUTPUT
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranspileOptions {
    /// `export default` when true, `exports.default =` otherwise.
    pub as_esm: bool,
    /// Re-print the output through oxc.
    pub format: bool,
    pub operator_mode: OperatorModeConfig,
    /// Callables lowered to `new <namespace>.<Name>(...)`.
    pub value_types: Vec<String>,
    pub value_type_namespace: String,
    /// Callee fragments that force `.call(...)`.
    pub add_call_keys: Vec<String>,
}

impl Default for TranspileOptions {
    fn default() -> Self {
        Self {
            as_esm: true,
            format: false,
            operator_mode: OperatorModeConfig::default(),
            value_types: [
                "Vector3",
                "FixQuaternion",
                "FixVector3",
                "Bounds",
                "Color",
                "LayerMask",
                "Plane",
                "Quaternion",
                "Ray",
                "Vector2",
                "Vector4",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            value_type_namespace: "CS.UnityEngine".to_string(),
            add_call_keys: vec!["listener[2]".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranspileOutput {
    /// JS module text, prefixed with an error block when not clean.
    pub code: String,
    pub diagnostics: Vec<CompilerError>,
    /// Factory classes sealed at module export, in declaration order.
    pub declared_classes: Vec<String>,
    pub operator_mode: bool,
}

impl TranspileOutput {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENTRY POINTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Translates one file. Never fails: parse and generation problems come
/// back as diagnostics together with an annotated best-effort output.
pub fn transpile(
    source: &str,
    source_path: &str,
    registries: &mut Registries,
    options: &TranspileOptions,
) -> TranspileOutput {
    let operator_mode = options.operator_mode.is_enabled_for(source_path);

    let mut tracker = ScopeTracker::new(source_path);
    let mut chunk = match parse_chunk(source, &mut tracker) {
        Ok(chunk) => chunk,
        Err(error) => {
            tracing::error!(file = %source_path, error = %error, "failed to parse Lua source");
            let diagnostic = CompilerError::new(
                L2J_PARSE_001,
                &error.message,
                source_path,
                error.line,
                error.column,
            );
            return TranspileOutput {
                code: annotate_with_error(&[diagnostic.to_string()], ""),
                diagnostics: vec![diagnostic],
                declared_classes: Vec::new(),
                operator_mode,
            };
        }
    };
    let annotations = tracker.into_annotations();

    for global in &chunk.globals {
        if !LUA_GLOBAL_LIB.contains(global.as_str()) {
            registries.record_global_read(global);
        }
    }

    let comments = std::mem::take(&mut chunk.comments);
    let module = Generator::new(source_path, options, registries, &annotations, comments)
        .generate_chunk(&chunk);

    tracing::debug!(
        file = %source_path,
        operator_mode,
        classes = module.declared_classes.len(),
        contained = module.diagnostics.len(),
        "translated Lua module"
    );

    let mut diagnostics: Vec<CompilerError> = module
        .diagnostics
        .iter()
        .map(|d| CompilerError::new(L2J_GEN_001, &d.message, source_path, d.line, d.column))
        .collect();

    let mut code = module.code;
    if options.format {
        match format_js(&code, source_path) {
            Ok(formatted) => code = formatted,
            Err(error) => diagnostics.push(error),
        }
    }

    if !diagnostics.is_empty() {
        tracing::error!(
            file = %source_path,
            count = diagnostics.len(),
            "translation not clean, output annotated with error block"
        );
        let messages: Vec<String> = diagnostics.iter().map(|d| d.to_string()).collect();
        code = annotate_with_error(&messages, &code);
    }

    TranspileOutput {
        code,
        diagnostics,
        declared_classes: module.declared_classes,
        operator_mode,
    }
}

/// Lua syntax tree as JSON, for inspecting what the translator sees.
pub fn lua_to_ast_json(source: &str, source_path: &str) -> Result<String, CompilerError> {
    let chunk = parse_chunk(source, &mut NoHooks).map_err(|error| {
        CompilerError::new(
            L2J_PARSE_001,
            &error.message,
            source_path,
            error.line,
            error.column,
        )
    })?;
    serde_json::to_string(&chunk)
        .map_err(|error| CompilerError::new(L2J_PARSE_001, &error.to_string(), source_path, 0, 0))
}

// ═══════════════════════════════════════════════════════════════════════════════
// NODE BINDINGS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "napi")]
lazy_static::lazy_static! {
    /// Registries of the current run when driven file by file from Node.
    static ref RUN_REGISTRIES: std::sync::Mutex<Registries> = std::sync::Mutex::new(Registries::new());
}

#[cfg(feature = "napi")]
#[napi]
pub fn lua2js(
    source: String,
    source_path: String,
    options: Option<serde_json::Value>,
) -> napi::Result<serde_json::Value> {
    let options: TranspileOptions = match options {
        Some(value) => serde_json::from_value(value).map_err(|e| napi::Error::from_reason(e.to_string()))?,
        None => TranspileOptions::default(),
    };
    let mut registries = RUN_REGISTRIES
        .lock()
        .map_err(|e| napi::Error::from_reason(e.to_string()))?;
    let output = transpile(&source, &source_path, &mut registries, &options);
    serde_json::to_value(output).map_err(|e| napi::Error::from_reason(e.to_string()))
}

#[cfg(feature = "napi")]
#[napi]
pub fn lua2ast(source: String, source_path: String) -> napi::Result<String> {
    lua_to_ast_json(&source, &source_path).map_err(|e| napi::Error::from_reason(e.to_string()))
}

#[cfg(feature = "napi")]
#[napi]
pub fn registries_snapshot() -> napi::Result<serde_json::Value> {
    let registries = RUN_REGISTRIES
        .lock()
        .map_err(|e| napi::Error::from_reason(e.to_string()))?;
    serde_json::to_value(&*registries).map_err(|e| napi::Error::from_reason(e.to_string()))
}

#[cfg(feature = "napi")]
#[napi]
pub fn reset_registries() -> napi::Result<()> {
    RUN_REGISTRIES
        .lock()
        .map_err(|e| napi::Error::from_reason(e.to_string()))?
        .reset();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: TranspileOptions =
            serde_json::from_str(r#"{"asEsm": false, "operatorMode": {"enableSegments": ["Fight/"]}}"#)
                .unwrap();
        assert!(!options.as_esm);
        assert_eq!(options.operator_mode.enable_segments, vec!["Fight/"]);
        assert_eq!(options.operator_mode.disable_segments, vec!["DataCenter", "battleLog"]);
        assert_eq!(options.value_type_namespace, "CS.UnityEngine");
        assert!(options.value_types.iter().any(|v| v == "Vector3"));
    }

    #[test]
    fn test_parse_failure_is_reported_not_raised() {
        let mut registries = Registries::new();
        let output = transpile("local = 1", "bad.lua", &mut registries, &TranspileOptions::default());
        assert!(!output.is_clean());
        assert_eq!(output.diagnostics[0].code, L2J_PARSE_001);
        assert!(output.code.starts_with("/*\nL2J-PARSE-001 bad.lua:1:"));
        assert!(registries.global_reads.is_empty());
    }

    #[test]
    fn test_globals_recorded_without_runtime_names() {
        let mut registries = Registries::new();
        transpile(
            "print(Config.name)\nlocal x = helper()",
            "a.lua",
            &mut registries,
            &TranspileOptions::default(),
        );
        assert!(registries.is_global_read("Config"));
        assert!(registries.is_global_read("helper"));
        assert!(!registries.is_global_read("print"));
        assert!(!registries.is_global_read("x"));
    }

    #[test]
    fn test_ast_json_dump() {
        let json = lua_to_ast_json("local a = 1", "a.lua").unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["body"][0]["kind"]["type"], "Local");
        assert_eq!(value["globals"], serde_json::json!([]));
    }
}
