//! Tagger configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the exiftool-based tagger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaggerConfig {
    /// Path to the exiftool binary.
    #[serde(default = "default_exiftool_path")]
    pub exiftool_path: PathBuf,

    /// Per-file timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_exiftool_path() -> PathBuf {
    PathBuf::from("exiftool")
}

fn default_timeout() -> u64 {
    60
}

impl Default for TaggerConfig {
    fn default() -> Self {
        Self {
            exiftool_path: default_exiftool_path(),
            timeout_secs: default_timeout(),
        }
    }
}
