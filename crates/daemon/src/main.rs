use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use porter_core::{
    build_report, load_config, metrics, validate_config, ArchiveExtractor, ArchiveSource,
    CommandExtractor, DiskBudget, ExiftoolTagger, LibraryUploader, LocalDirSource, MediaPipeline,
    MediaUploader, PipelineOrchestrator, SqliteStateStore, StateStore,
};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("PHOTOPORTER_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("photoporter {} loading configuration from {:?}", VERSION, config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Source root: {:?}", config.source.root);
    info!("Library: {:?}", config.uploader.library_dir);
    info!("Database path: {:?}", config.database.path);
    match config.budget.ceiling_bytes {
        Some(ceiling) => info!("Disk budget: {} bytes", ceiling),
        None => info!("Disk budget: unlimited"),
    }

    // Register metrics
    let registry = prometheus::Registry::new();
    for metric in metrics::all_metrics() {
        registry
            .register(metric)
            .context("Failed to register metrics")?;
    }

    // Prepare the working directory
    tokio::fs::create_dir_all(&config.storage.work_dir)
        .await
        .context("Failed to create working directory")?;

    // State store: corruption of the persisted state is fatal here,
    // never silently reset.
    let store: Arc<dyn StateStore> = Arc::new(
        SqliteStateStore::new(&config.database.path).context("Failed to open state store")?,
    );

    // Disk budget governor over the working directory
    let budget = Arc::new(DiskBudget::new(
        config.budget.clone(),
        &config.storage.work_dir,
    ));

    // External collaborators
    let source: Arc<dyn ArchiveSource> = Arc::new(LocalDirSource::new(&config.source.root));
    let extractor: Arc<dyn ArchiveExtractor> =
        Arc::new(CommandExtractor::new(config.extractor.clone()));
    let tagger = ExiftoolTagger::new(config.tagger.clone());
    let uploader = LibraryUploader::new(config.uploader.clone());
    uploader
        .validate()
        .await
        .context("Destination library is not usable")?;

    // Media pipeline and orchestrator
    let pipeline = Arc::new(MediaPipeline::new(
        config.pipeline.clone(),
        Arc::clone(&store),
        tagger,
        uploader,
        config.retry.clone(),
    ));

    let orchestrator = PipelineOrchestrator::new(
        config.orchestrator.clone(),
        Arc::clone(&store),
        source,
        extractor,
        Arc::clone(&pipeline),
        budget,
        config.retry.clone(),
        &config.storage.work_dir,
    );

    if config.orchestrator.enabled {
        orchestrator.start().await;
    } else {
        warn!("Orchestrator is disabled; nothing will be processed automatically");
    }

    info!("photoporter running, press Ctrl+C to stop");
    signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutdown signal received");
    orchestrator.stop().await;

    // Report what this run achieved and what needs an operator.
    let report = build_report(store.as_ref()).context("Failed to build run report")?;
    info!("Run report:\n{}", report);
    if orchestrator.is_paused() {
        warn!("Run is paused for operator attention; restart after resolving failures");
    }

    Ok(())
}
