//! Discovery Module for the Lua translator
//!
//! Batch driver: finds `.lua` sources under a directory and translates them
//! one after another against a shared `Registries`. Translation order is
//! the sorted path order so registry-dependent output is reproducible.
//! Formatting has no cross-file state and runs in parallel afterwards.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::finalize::{annotate_with_error, format_js};
use crate::registry::Registries;
use crate::transform::{transpile, TranspileOptions, TranspileOutput};
use crate::validate::{CompilerError, L2J_IO_001};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOutput {
    pub path: String,
    pub output: TranspileOutput,
}

/// All `.lua` files below `dir`, sorted.
pub fn find_lua_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).follow_links(true).into_iter().flatten() {
        let path = entry.path();
        if path.is_file() && path.extension().map(|ext| ext == "lua").unwrap_or(false) {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    files
}

/// Translates `files` in order; see module docs for the formatting pass.
pub fn transpile_files(
    files: &[PathBuf],
    registries: &mut Registries,
    options: &TranspileOptions,
) -> Vec<FileOutput> {
    let translate_options = TranspileOptions {
        format: false,
        ..options.clone()
    };

    let mut outputs: Vec<FileOutput> = files
        .iter()
        .map(|file| {
            let path = file.to_string_lossy().to_string();
            let output = match fs::read_to_string(file) {
                Ok(source) => transpile(&source, &path, registries, &translate_options),
                Err(e) => unreadable(&path, &e, &translate_options),
            };
            FileOutput { path, output }
        })
        .collect();

    if options.format {
        outputs.par_iter_mut().for_each(format_output);
    }

    let failed = outputs.iter().filter(|f| !f.output.is_clean()).count();
    tracing::debug!(files = outputs.len(), failed, "batch translation finished");

    outputs
}

/// `find_lua_files` + `transpile_files`.
pub fn transpile_dir(dir: &Path, registries: &mut Registries, options: &TranspileOptions) -> Vec<FileOutput> {
    let files = find_lua_files(dir);
    transpile_files(&files, registries, options)
}

fn unreadable(path: &str, error: &std::io::Error, options: &TranspileOptions) -> TranspileOutput {
    tracing::error!(file = %path, error = %error, "failed to read Lua source");
    let diagnostic = CompilerError::new(
        L2J_IO_001,
        &format!("Failed to read file: {}", error),
        path,
        0,
        0,
    );
    TranspileOutput {
        code: annotate_with_error(&[diagnostic.to_string()], ""),
        diagnostics: vec![diagnostic],
        declared_classes: Vec::new(),
        operator_mode: options.operator_mode.is_enabled_for(path),
    }
}

/// Only clean outputs are re-printed; annotated ones are kept as they are.
fn format_output(file: &mut FileOutput) {
    if !file.output.is_clean() {
        return;
    }
    match format_js(&file.output.code, &file.path) {
        Ok(formatted) => file.output.code = formatted,
        Err(error) => {
            file.output.code = annotate_with_error(&[error.to_string()], &file.output.code);
            file.output.diagnostics.push(error);
        }
    }
}
