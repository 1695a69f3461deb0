//! Error types for the tagger module.

use std::path::PathBuf;
use thiserror::Error;

use crate::retry::FailureKind;

/// Errors that can occur while applying metadata.
#[derive(Debug, Error)]
pub enum TagError {
    /// Tagging tool binary not found.
    #[error("tagging tool not found at path: {path}")]
    ToolNotFound { path: PathBuf },

    /// Media file not found.
    #[error("media file not found: {path}")]
    MediaNotFound { path: PathBuf },

    /// The tool ran and failed.
    #[error("tagging failed: {reason}")]
    ToolFailed {
        reason: String,
        stderr: Option<String>,
    },

    /// The tool did not finish in time.
    #[error("tagging timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// I/O error while invoking the tool.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TagError {
    /// Creates a new tool-failed error with stderr output.
    pub fn tool_failed(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::ToolFailed {
            reason: reason.into(),
            stderr,
        }
    }

    /// Maps this error into the closed failure taxonomy.
    pub fn kind(&self) -> FailureKind {
        match self {
            TagError::Timeout { .. } | TagError::Io(_) => FailureKind::Transient,
            TagError::ToolNotFound { .. }
            | TagError::MediaNotFound { .. }
            | TagError::ToolFailed { .. } => FailureKind::Permanent,
        }
    }
}
