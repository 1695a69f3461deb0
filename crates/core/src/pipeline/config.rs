//! Pipeline configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the media pipeline worker pools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum concurrent metadata merges (tagging tool invocations).
    #[serde(default = "default_max_merges")]
    pub max_parallel_merges: usize,

    /// Maximum concurrent uploads. Typically larger than the download
    /// pool, reflecting network asymmetry.
    #[serde(default = "default_max_uploads")]
    pub max_parallel_uploads: usize,
}

fn default_max_merges() -> usize {
    4
}

fn default_max_uploads() -> usize {
    8
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_parallel_merges: default_max_merges(),
            max_parallel_uploads: default_max_uploads(),
        }
    }
}
