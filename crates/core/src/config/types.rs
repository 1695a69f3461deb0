use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::budget::DiskBudgetConfig;
use crate::extractor::ExtractorConfig;
use crate::orchestrator::OrchestratorConfig;
use crate::pipeline::PipelineConfig;
use crate::retry::RetryPolicy;
use crate::tagger::TaggerConfig;
use crate::uploader::UploaderConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Where the exported archives are served from.
    pub source: SourceConfig,
    /// Destination library.
    pub uploader: UploaderConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub budget: DiskBudgetConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub tagger: TaggerConfig,
}

/// Archive source configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    /// Directory holding the exported archives.
    pub root: PathBuf,
}

/// Local working storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Scratch directory for fetched archives and extracted contents.
    /// This is the directory the disk budget governs.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
        }
    }
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("work")
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("photoporter.db")
}
