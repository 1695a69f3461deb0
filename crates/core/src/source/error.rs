//! Error types for the archive source module.

use thiserror::Error;

use crate::retry::FailureKind;

/// Errors that can occur while listing or fetching archives.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The requested archive does not exist at the source.
    #[error("archive not found at source: {0}")]
    NotFound(String),

    /// The source is temporarily unreachable.
    #[error("source unavailable: {reason}")]
    Unavailable { reason: String },

    /// The transfer started but did not complete.
    #[error("transfer failed: {reason}")]
    TransferFailed { reason: String },

    /// I/O error while writing the fetched bytes.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    /// Creates an unavailable error.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Creates a transfer-failed error.
    pub fn transfer_failed(reason: impl Into<String>) -> Self {
        Self::TransferFailed {
            reason: reason.into(),
        }
    }

    /// Maps this error into the closed failure taxonomy.
    pub fn kind(&self) -> FailureKind {
        match self {
            SourceError::Unavailable { .. }
            | SourceError::TransferFailed { .. }
            | SourceError::Io(_) => FailureKind::Transient,
            SourceError::NotFound(_) => FailureKind::Permanent,
        }
    }
}
