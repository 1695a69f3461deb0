//! Types for the pipeline orchestrator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during orchestration.
///
/// Per-unit collaborator failures never surface here; they are
/// classified and recorded against the unit. These variants are
/// infrastructure failures.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// State store error.
    #[error("state store error: {0}")]
    State(#[from] crate::state::StateError),

    /// Archive source error during discovery.
    #[error("source error: {0}")]
    Source(#[from] crate::source::SourceError),

    /// Media pipeline error.
    #[error("pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),

    /// Missing required data in a unit record.
    #[error("missing data in unit: {0}")]
    MissingData(String),
}

/// Current status of the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    /// Whether the orchestrator is running.
    pub running: bool,
    /// Whether automatic progress is paused for operator attention.
    pub paused_for_retries: bool,
    /// Archives currently owned by a download or extract worker.
    pub active_archives: usize,
    /// Archives waiting to be downloaded.
    pub discovered_count: u64,
    /// Archives downloading right now.
    pub downloading_count: u64,
    /// Archives downloaded, waiting for extraction.
    pub downloaded_count: u64,
    /// Archives fully processed, waiting for cleanup.
    pub processed_count: u64,
    /// Archives cleaned.
    pub cleaned_count: u64,
    /// Archives with corrupt source bytes.
    pub corrupted_count: u64,
    /// Media items not yet terminal.
    pub media_in_flight: u64,
    /// Media items durably uploaded.
    pub media_uploaded: u64,
    /// Media items permanently failed.
    pub media_failed: u64,
}
