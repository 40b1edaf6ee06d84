//! Configuration types

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for the verifying backend decorator.
///
/// Both values are injected at construction; the wrapper never reaches for
/// ambient globals to find its diagnostics directory or repair policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Overwrite a mismatched inner-backend entry with the freshly produced
    /// bytes instead of only reporting the divergence.
    pub auto_repair: bool,
    /// Directory receiving `<key>.fromcache` / `<key>.verify` dumps when a
    /// mismatch is detected. Created on demand.
    pub diagnostics_dir: PathBuf,
}

impl VerifyConfig {
    /// Create a config with auto-repair disabled.
    pub fn new(diagnostics_dir: impl Into<PathBuf>) -> Self {
        Self {
            auto_repair: false,
            diagnostics_dir: diagnostics_dir.into(),
        }
    }

    /// Enable or disable auto-repair.
    pub fn with_auto_repair(mut self, enabled: bool) -> Self {
        self.auto_repair = enabled;
        self
    }

    /// Set the diagnostics directory.
    pub fn with_diagnostics_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.diagnostics_dir = dir.into();
        self
    }

    /// The diagnostics directory as a path.
    pub fn diagnostics_dir(&self) -> &Path {
        &self.diagnostics_dir
    }
}
