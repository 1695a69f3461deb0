//! Types for the extractor module.

use std::path::PathBuf;

/// One file produced by extracting an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedEntry {
    /// Path relative to the extraction destination.
    pub relative_path: PathBuf,
    /// Size in bytes on disk.
    pub size_bytes: u64,
}
