//! Types for the pipeline module.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Atomic statistics for a worker pool.
#[derive(Debug, Default)]
pub struct PoolStats {
    pub active: AtomicU64,
    pub queued: AtomicU64,
    pub total_processed: AtomicU64,
    pub total_failed: AtomicU64,
}

impl PoolStats {
    /// Snapshots the stats into a serializable status.
    pub fn to_status(&self, name: &str, max_concurrent: usize) -> PoolStatus {
        PoolStatus {
            name: name.to_string(),
            active_jobs: self.active.load(Ordering::Relaxed) as usize,
            max_concurrent,
            queued_jobs: self.queued.load(Ordering::Relaxed) as usize,
            total_processed: self.total_processed.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of one worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStatus {
    pub name: String,
    pub active_jobs: usize,
    pub max_concurrent: usize,
    pub queued_jobs: usize,
    pub total_processed: u64,
    pub total_failed: u64,
}

/// Snapshot of the whole media pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStatus {
    pub running: bool,
    pub merge_pool: PoolStatus,
    pub upload_pool: PoolStatus,
    /// Items currently being driven by a pipeline task.
    pub active_items: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_stats_snapshot() {
        let stats = PoolStats::default();
        stats.active.store(2, Ordering::Relaxed);
        stats.total_processed.store(10, Ordering::Relaxed);

        let status = stats.to_status("upload", 8);
        assert_eq!(status.name, "upload");
        assert_eq!(status.active_jobs, 2);
        assert_eq!(status.max_concurrent, 8);
        assert_eq!(status.total_processed, 10);
    }
}
