pub mod album;
pub mod budget;
pub mod config;
pub mod extractor;
pub mod fingerprint;
pub mod metrics;
pub mod orchestrator;
pub mod pipeline;
pub mod report;
pub mod retry;
pub mod source;
pub mod state;
pub mod tagger;
pub mod testing;
pub mod uploader;

pub use album::{canonical_key, AlbumResolver, ResolvedAlbum};
pub use budget::{Admission, DiskBudget, DiskBudgetConfig};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, DatabaseConfig,
    SourceConfig, StorageConfig,
};
pub use extractor::{ArchiveExtractor, CommandExtractor, ExtractError, ExtractorConfig};
pub use orchestrator::{OrchestratorConfig, OrchestratorError, OrchestratorStatus, PipelineOrchestrator};
pub use pipeline::{MediaPipeline, PipelineConfig, PipelineError, PipelineStatus};
pub use report::{build_report, FailedItem, RunReport};
pub use retry::{FailureKind, RetryDecision, RetryPolicy, RetryRecord};
pub use source::{ArchiveSource, FetchedArchive, LocalDirSource, RemoteArchive, SourceError};
pub use state::{
    AlbumRecord, ArchivePhase, ArchiveRecord, MediaPhase, MediaRecord, SqliteStateStore,
    StateError, StateStore,
};
pub use tagger::{ExiftoolTagger, MediaMetadata, MetadataTagger, TagError, TaggerConfig};
pub use uploader::{LibraryUploader, MediaUploader, UploadError, UploadReceipt, UploaderConfig};
