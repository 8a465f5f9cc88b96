//! # Lua to JavaScript translator
//!
//! Source-to-source translation of Lua 5.3 modules into ES modules that run
//! on the `l2j` runtime shim.
//!
//! ## Pipeline
//!
//! 1. **Parse** (`lexer`, `parse`): Lua text to a located syntax tree with a
//!    comment list and the globals referenced. Scope hooks fire while parsing.
//! 2. **Scope tracking** (`scope`): duplicate local declarations and `_`
//!    placeholders are recorded in an `Annotations` side table.
//! 3. **Generation** (`codegen`, `classify`, `class_lowering`, `comments`):
//!    one recursive pass producing JS text, with comments and blank lines
//!    replayed at their source positions.
//! 4. **Finalize** (`finalize`): optional oxc re-print; diagnostics are folded
//!    into a leading error block.
//!
//! ## Invariants
//!
//! - Lua tables stay 1-based keyed objects; length, insert and concat always
//!   go through runtime calls.
//! - `and`/`or` producing a value use Lua truthiness (`l2j.condition`).
//! - One file's failure never aborts a run. `transpile` always returns text.
//! - `Registries` is owned by the caller and only ever grows within a run.

mod ast;
mod class_lowering;
mod classify;
mod codegen;
mod comments;
mod discovery;
mod finalize;
mod lexer;
mod parse;
mod registry;
mod scope;
mod transform;
mod validate;

#[cfg(test)]
mod codegen_tests;

pub use discovery::{find_lua_files, transpile_dir, transpile_files, FileOutput};
pub use finalize::{annotate_with_error, format_js};
pub use parse::ParseError;
pub use registry::{OperatorModeConfig, Registries};
pub use transform::{lua_to_ast_json, transpile, TranspileOptions, TranspileOutput};
pub use validate::*;

#[cfg(feature = "napi")]
pub use transform::{lua2ast, lua2js, registries_snapshot, reset_registries};
