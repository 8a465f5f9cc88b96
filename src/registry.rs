//! Registries Module for the Lua translator
//!
//! Cross-file accumulation of runtime namespace usage and global variable
//! traffic, plus the per-file operator-mode decision.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ═══════════════════════════════════════════════════════════════════════════════
// REGISTRIES
// ═══════════════════════════════════════════════════════════════════════════════

/// Append-only sets shared by every file of one run.
///
/// Owned by the caller and threaded through each `transpile` call; nothing in
/// a single translation clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registries {
    /// Qualified runtime functions referenced, e.g. `table.insert`.
    pub system_functions: BTreeSet<String>,
    /// Globals read by the translated programs.
    pub global_reads: BTreeSet<String>,
    /// Globals that received an initializing assignment.
    pub initialized_globals: BTreeSet<String>,
}

impl Registries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start of a new run.
    pub fn reset(&mut self) {
        self.system_functions.clear();
        self.global_reads.clear();
        self.initialized_globals.clear();
    }

    pub fn merge(&mut self, other: Registries) {
        self.system_functions.extend(other.system_functions);
        self.global_reads.extend(other.global_reads);
        self.initialized_globals.extend(other.initialized_globals);
    }

    pub fn record_system_function(&mut self, library: &str, name: &str) {
        self.system_functions.insert(format!("{}.{}", library, name));
    }

    pub fn record_global_read(&mut self, name: &str) {
        self.global_reads.insert(name.to_string());
    }

    /// Returns false when the global was already initialized in this run.
    pub fn record_initialized_global(&mut self, name: &str) -> bool {
        self.initialized_globals.insert(name.to_string())
    }

    pub fn is_global_read(&self, name: &str) -> bool {
        self.global_reads.contains(name)
    }

    pub fn is_initialized_global(&self, name: &str) -> bool {
        self.initialized_globals.contains(name)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OPERATOR MODE
// ═══════════════════════════════════════════════════════════════════════════════

/// Path segments deciding whether arithmetic lowers to `l2j.*` calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OperatorModeConfig {
    pub enable_segments: Vec<String>,
    pub disable_segments: Vec<String>,
}

impl Default for OperatorModeConfig {
    fn default() -> Self {
        Self {
            enable_segments: vec!["Battle/".to_string(), "BattleView/".to_string()],
            disable_segments: vec!["DataCenter".to_string(), "battleLog".to_string()],
        }
    }
}

impl OperatorModeConfig {
    /// Substring match on the path with `\` normalized to `/`.
    pub fn is_enabled_for(&self, source_path: &str) -> bool {
        let path = source_path.replace('\\', "/");
        if self
            .disable_segments
            .iter()
            .any(|segment| path.contains(segment.as_str()))
        {
            return false;
        }
        self.enable_segments
            .iter()
            .any(|segment| path.contains(segment.as_str()))
    }
}
