//! Orchestrator configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the pipeline orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Enable/disable the orchestrator.
    /// When disabled, nothing is processed automatically.
    #[serde(default)]
    pub enabled: bool,

    /// How often to poll the source for new archives (milliseconds).
    #[serde(default = "default_discovery_interval")]
    pub discovery_poll_interval_ms: u64,

    /// How often the archive loop runs (milliseconds).
    #[serde(default = "default_archive_interval")]
    pub archive_poll_interval_ms: u64,

    /// How often the media loop runs (milliseconds).
    #[serde(default = "default_media_interval")]
    pub media_poll_interval_ms: u64,

    /// Maximum concurrent archive downloads.
    #[serde(default = "default_max_downloads")]
    pub max_concurrent_downloads: usize,

    /// Maximum concurrent archive extractions.
    #[serde(default = "default_max_extractions")]
    pub max_concurrent_extractions: usize,

    /// How many units each loop tick pulls from the store.
    #[serde(default = "default_admission_batch")]
    pub admission_batch: usize,

    /// Multiplier applied to an archive's size to estimate the disk
    /// needed for its extracted contents.
    #[serde(default = "default_extract_size_factor")]
    pub extract_size_factor: f64,

    /// Delete local archive and extracted files once every contained
    /// item is uploaded.
    #[serde(default = "default_cleanup_enabled")]
    pub cleanup_enabled: bool,

    /// Fraction of permanently failed media items (over terminal items)
    /// that pauses automatic progress for operator attention.
    #[serde(default = "default_pause_threshold")]
    pub pause_failure_threshold: f32,

    /// Minimum terminal items before the pause threshold is evaluated,
    /// so a single early failure cannot pause the whole run.
    #[serde(default = "default_pause_min_items")]
    pub pause_min_items: u64,
}

fn default_discovery_interval() -> u64 {
    30_000
}

fn default_archive_interval() -> u64 {
    2_000
}

fn default_media_interval() -> u64 {
    1_000
}

fn default_max_downloads() -> usize {
    2
}

fn default_max_extractions() -> usize {
    1
}

fn default_admission_batch() -> usize {
    32
}

fn default_extract_size_factor() -> f64 {
    1.5
}

fn default_cleanup_enabled() -> bool {
    true
}

fn default_pause_threshold() -> f32 {
    0.25
}

fn default_pause_min_items() -> u64 {
    20
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            discovery_poll_interval_ms: default_discovery_interval(),
            archive_poll_interval_ms: default_archive_interval(),
            media_poll_interval_ms: default_media_interval(),
            max_concurrent_downloads: default_max_downloads(),
            max_concurrent_extractions: default_max_extractions(),
            admission_batch: default_admission_batch(),
            extract_size_factor: default_extract_size_factor(),
            cleanup_enabled: default_cleanup_enabled(),
            pause_failure_threshold: default_pause_threshold(),
            pause_min_items: default_pause_min_items(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.max_concurrent_downloads, 2);
        assert_eq!(config.max_concurrent_extractions, 1);
        assert!(config.cleanup_enabled);
        assert_eq!(config.pause_min_items, 20);
    }

    #[test]
    fn test_deserialize_minimal() {
        let config: OrchestratorConfig = toml::from_str("enabled = true").unwrap();
        assert!(config.enabled);
        assert_eq!(config.archive_poll_interval_ms, 2_000);
    }

    #[test]
    fn test_deserialize_full() {
        let config: OrchestratorConfig = toml::from_str(
            r#"
            enabled = true
            discovery_poll_interval_ms = 60000
            max_concurrent_downloads = 4
            max_concurrent_extractions = 2
            extract_size_factor = 2.0
            cleanup_enabled = false
            pause_failure_threshold = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(config.max_concurrent_downloads, 4);
        assert_eq!(config.extract_size_factor, 2.0);
        assert!(!config.cleanup_enabled);
        assert_eq!(config.pause_failure_threshold, 0.5);
    }
}
