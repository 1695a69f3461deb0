//! Disk budget configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the disk budget governor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskBudgetConfig {
    /// Total bytes the pipeline may consume in the working directory.
    /// `None` means unlimited.
    #[serde(default)]
    pub ceiling_bytes: Option<u64>,

    /// How long a usage measurement stays fresh (milliseconds). Once it
    /// goes stale the working directory is re-walked before the next
    /// admission decision, correcting bookkeeping drift from files
    /// created outside the tracked operations.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_ms: u64,
}

fn default_refresh_interval() -> u64 {
    30_000
}

impl Default for DiskBudgetConfig {
    fn default() -> Self {
        Self {
            ceiling_bytes: None,
            refresh_interval_ms: default_refresh_interval(),
        }
    }
}
