//! Pipeline orchestrator.
//!
//! Drives archive units through the state machine automatically:
//! - **Discovery**: polls the source for new archives
//! - **Download/Extract**: bounded worker pools gated by the disk budget
//! - **Media**: hands extracted items to the media pipeline
//! - **Finalize**: marks archives processed and performs safe cleanup
//!
//! When the permanent-failure fraction crosses the configured threshold
//! the orchestrator pauses new admissions and cleanup until an operator
//! explicitly signals `proceed`.

mod config;
mod runner;
mod types;

pub use config::OrchestratorConfig;
pub use runner::PipelineOrchestrator;
pub use types::{OrchestratorError, OrchestratorStatus};
