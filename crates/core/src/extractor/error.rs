//! Error types for the extractor module.

use std::path::PathBuf;
use thiserror::Error;

use crate::retry::FailureKind;

/// Errors that can occur during archive verification or extraction.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Archive file not found on local disk.
    #[error("archive not found: {path}")]
    ArchiveNotFound { path: PathBuf },

    /// The archive failed integrity verification or is truncated.
    #[error("corrupt archive: {reason}")]
    CorruptArchive { reason: String },

    /// Extraction tool binary not found.
    #[error("extraction tool not found at path: {path}")]
    ToolNotFound { path: PathBuf },

    /// The tool ran and failed for a reason other than corruption.
    #[error("extraction failed: {reason}")]
    ToolFailed {
        reason: String,
        stderr: Option<String>,
    },

    /// The tool did not finish in time.
    #[error("extraction timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// I/O error during extraction.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtractError {
    /// Creates a corrupt-archive error.
    pub fn corrupt(reason: impl Into<String>) -> Self {
        Self::CorruptArchive {
            reason: reason.into(),
        }
    }

    /// Maps this error into the closed failure taxonomy.
    ///
    /// Corruption is never classified as retryable: retrying identical
    /// corrupt bytes cannot succeed.
    pub fn kind(&self) -> FailureKind {
        match self {
            ExtractError::CorruptArchive { .. } => FailureKind::CorruptInput,
            ExtractError::Timeout { .. } | ExtractError::Io(_) => FailureKind::Transient,
            ExtractError::ArchiveNotFound { .. }
            | ExtractError::ToolNotFound { .. }
            | ExtractError::ToolFailed { .. } => FailureKind::Permanent,
        }
    }
}
