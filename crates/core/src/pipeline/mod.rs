//! Media item pipeline: bounded-concurrency workers for the
//! metadata-merge, album-resolution and upload stages.
//!
//! Each stage pool is independently sized. Workers never mutate shared
//! records except through the state store's compare-and-swap
//! transitions; an item's stages always run in order within its own
//! task.

mod config;
mod processor;
mod types;

pub use config::PipelineConfig;
pub use processor::{MediaPipeline, PipelineError};
pub use types::{PipelineStatus, PoolStats, PoolStatus};
