//! Extractor configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the command-driven extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Path to the unzip binary.
    #[serde(default = "default_unzip_path")]
    pub unzip_path: PathBuf,

    /// Per-archive timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_unzip_path() -> PathBuf {
    PathBuf::from("unzip")
}

fn default_timeout() -> u64 {
    30 * 60
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            unzip_path: default_unzip_path(),
            timeout_secs: default_timeout(),
        }
    }
}
