//! Error types for the uploader module.

use std::path::PathBuf;
use thiserror::Error;

use crate::retry::FailureKind;

/// Errors that can occur during upload.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The local media file to upload is missing.
    #[error("media file not found: {path}")]
    FileNotFound { path: PathBuf },

    /// The destination asked us to slow down.
    #[error("rate limited by destination")]
    RateLimited,

    /// Transfer-level failure (connection reset, timeout).
    #[error("transfer failed: {reason}")]
    TransferFailed { reason: String },

    /// The destination refused the item (unsupported type, quota).
    #[error("upload rejected: {reason}")]
    Rejected { reason: String },

    /// I/O error while reading the media file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl UploadError {
    /// Creates a transfer-failed error.
    pub fn transfer_failed(reason: impl Into<String>) -> Self {
        Self::TransferFailed {
            reason: reason.into(),
        }
    }

    /// Creates a rejected error.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    /// Maps this error into the closed failure taxonomy.
    pub fn kind(&self) -> FailureKind {
        match self {
            UploadError::RateLimited | UploadError::TransferFailed { .. } | UploadError::Io(_) => {
                FailureKind::Transient
            }
            UploadError::FileNotFound { .. } | UploadError::Rejected { .. } => {
                FailureKind::Permanent
            }
        }
    }
}
