//! Uploader configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the library-tree uploader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploaderConfig {
    /// Root of the destination library.
    pub library_dir: PathBuf,

    /// Directory name for items that belong to no album.
    #[serde(default = "default_unsorted")]
    pub unsorted_dir: String,

    /// Overwrite files already present at the destination.
    #[serde(default)]
    pub overwrite: bool,
}

fn default_unsorted() -> String {
    "Unsorted".to_string()
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            library_dir: PathBuf::from("library"),
            unsorted_dir: default_unsorted(),
            overwrite: false,
        }
    }
}
