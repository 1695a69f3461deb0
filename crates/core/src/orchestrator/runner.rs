//! Pipeline orchestrator implementation.
//!
//! Three loops drive the run:
//! - Discovery: polls the source, records new archives
//! - Archive: admits downloads and extractions through the disk budget,
//!   finalizes and cleans up finished archives
//! - Media: feeds extracted items to the media pipeline
//!
//! All phase changes go through the state store's compare-and-swap
//! transitions; the loops themselves hold no unit state beyond an
//! in-memory set of archives currently owned by a worker task.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::sync::{broadcast, RwLock, Semaphore};
use tracing::{debug, error, info, warn};

use crate::budget::{Admission, DiskBudget};
use crate::extractor::ArchiveExtractor;
use crate::fingerprint::file_fingerprint;
use crate::metrics;
use crate::pipeline::{MediaPipeline, PipelineError};
use crate::retry::{FailureKind, RetryDecision, RetryPolicy, RetryRecord};
use crate::source::ArchiveSource;
use crate::state::{ArchivePhase, ArchiveRecord, MediaPhase, MediaRecord, StateError, StateStore};
use crate::tagger::MetadataTagger;
use crate::uploader::MediaUploader;

use super::config::OrchestratorConfig;
use super::types::{OrchestratorError, OrchestratorStatus};

/// How many files are fingerprinted concurrently after an extraction.
const FINGERPRINT_CONCURRENCY: usize = 8;

/// Upper bound when listing units during startup recovery.
const RECOVERY_BATCH: usize = 10_000;

/// Extensions treated as media. Sidecar `.json` files and anything else
/// ride along on disk but are not tracked as items.
const MEDIA_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "heic", "heif", "webp", "bmp", "tif", "tiff", "dng", "cr2",
    "nef", "arw", "mp4", "mov", "avi", "mkv", "webm", "m4v", "3gp", "mts", "m2ts",
];

/// The pipeline orchestrator - drives archive units and their media
/// items through the processing pipeline.
pub struct PipelineOrchestrator<T, U>
where
    T: MetadataTagger + 'static,
    U: MediaUploader + 'static,
{
    config: OrchestratorConfig,
    store: Arc<dyn StateStore>,
    source: Arc<dyn ArchiveSource>,
    extractor: Arc<dyn ArchiveExtractor>,
    pipeline: Arc<MediaPipeline<T, U>>,
    budget: Arc<DiskBudget>,
    policy: RetryPolicy,
    work_dir: PathBuf,

    // Runtime state
    running: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    /// Failure count the operator has already seen and waved through.
    /// The pause only re-arms when failures grow past this mark.
    acknowledged_failures: Arc<AtomicU64>,
    download_semaphore: Arc<Semaphore>,
    extract_semaphore: Arc<Semaphore>,
    active_archives: Arc<RwLock<HashSet<String>>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl<T, U> PipelineOrchestrator<T, U>
where
    T: MetadataTagger + 'static,
    U: MediaUploader + 'static,
{
    /// Creates a new orchestrator.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: OrchestratorConfig,
        store: Arc<dyn StateStore>,
        source: Arc<dyn ArchiveSource>,
        extractor: Arc<dyn ArchiveExtractor>,
        pipeline: Arc<MediaPipeline<T, U>>,
        budget: Arc<DiskBudget>,
        policy: RetryPolicy,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let download_semaphore = Arc::new(Semaphore::new(config.max_concurrent_downloads.max(1)));
        let extract_semaphore = Arc::new(Semaphore::new(config.max_concurrent_extractions.max(1)));

        Self {
            config,
            store,
            source,
            extractor,
            pipeline,
            budget,
            policy,
            work_dir: work_dir.into(),
            running: Arc::new(AtomicBool::new(false)),
            paused: Arc::new(AtomicBool::new(false)),
            acknowledged_failures: Arc::new(AtomicU64::new(0)),
            download_semaphore,
            extract_semaphore,
            active_archives: Arc::new(RwLock::new(HashSet::new())),
            shutdown_tx,
        }
    }

    /// Starts the orchestrator (spawns background loops).
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("orchestrator already running");
            return;
        }

        info!("starting pipeline orchestrator");
        self.pipeline.start();

        // Re-admit units that were in flight during an unclean shutdown
        // from their last durably committed phase.
        if let Err(e) = self.recover_interrupted() {
            error!("failed to recover interrupted units: {}", e);
        }

        // The pause state is re-derived from the store before anything
        // is admitted, so a restart cannot sidestep a paused run.
        Self::evaluate_pause(
            &self.store,
            &self.config,
            &self.paused,
            &self.acknowledged_failures,
        );

        self.spawn_discovery_loop();
        self.spawn_archive_loop();
        self.spawn_media_loop();

        info!("pipeline orchestrator started");
    }

    /// Stops the orchestrator gracefully: no new admissions, in-flight
    /// operations reach their next durable checkpoint.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("orchestrator not running");
            return;
        }

        info!("stopping pipeline orchestrator");
        self.pipeline.stop();
        let _ = self.shutdown_tx.send(());

        // Give in-flight workers a moment to park at a checkpoint.
        tokio::time::sleep(Duration::from_millis(500)).await;

        info!("pipeline orchestrator stopped");
    }

    /// Operator signal: resume automatic progress after a pause. The
    /// current failures are considered acknowledged; the pause re-arms
    /// only if new ones accumulate.
    pub fn proceed(&self) {
        if let Ok(failed) = self.store.count_media_by_phase(MediaPhase::Failed) {
            self.acknowledged_failures.store(failed, Ordering::SeqCst);
        }
        if self.paused.swap(false, Ordering::SeqCst) {
            info!("operator proceed received, resuming automatic progress");
        }
    }

    /// Returns true while the orchestrator is paused for operator
    /// attention.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    /// Get current orchestrator status.
    pub async fn status(&self) -> Result<OrchestratorStatus, OrchestratorError> {
        let store = &self.store;
        let media_in_flight = store.count_media_by_phase(MediaPhase::Extracted)?
            + store.count_media_by_phase(MediaPhase::MetadataMerged)?
            + store.count_media_by_phase(MediaPhase::AlbumResolved)?
            + store.count_media_by_phase(MediaPhase::Uploading)?;

        Ok(OrchestratorStatus {
            running: self.running.load(Ordering::Relaxed),
            paused_for_retries: self.paused.load(Ordering::Relaxed),
            active_archives: self.active_archives.read().await.len(),
            discovered_count: store.count_archives_by_phase(ArchivePhase::Discovered)?,
            downloading_count: store.count_archives_by_phase(ArchivePhase::Downloading)?,
            downloaded_count: store.count_archives_by_phase(ArchivePhase::Downloaded)?,
            processed_count: store.count_archives_by_phase(ArchivePhase::Processed)?,
            cleaned_count: store.count_archives_by_phase(ArchivePhase::Cleaned)?,
            corrupted_count: store.count_archives_by_phase(ArchivePhase::Corrupted)?,
            media_in_flight,
            media_uploaded: store.count_media_by_phase(MediaPhase::Uploaded)?,
            media_failed: store.count_media_by_phase(MediaPhase::Failed)?,
        })
    }

    /// Resets units left in worker-owned phases by an unclean shutdown
    /// back to their last durably committed phase. Runs before any loop
    /// starts, so no worker owns anything yet.
    fn recover_interrupted(&self) -> Result<(), OrchestratorError> {
        for phase in [ArchivePhase::Downloading, ArchivePhase::Extracting] {
            let target = phase.reset_target().unwrap_or(ArchivePhase::Discovered);
            for record in self.store.list_archives_by_phase(phase, RECOVERY_BATCH)? {
                self.store.transition_archive(&record.id, phase, target)?;
                info!("recovered archive {} from {} to {}", record.id, phase, target);
            }
        }

        for record in self
            .store
            .list_media_by_phase(MediaPhase::Uploading, RECOVERY_BATCH)?
        {
            self.store.transition_media(
                &record.id,
                MediaPhase::Uploading,
                MediaPhase::AlbumResolved,
            )?;
            info!("recovered media item {} from uploading", record.id);
        }
        Ok(())
    }

    /// Spawn the discovery loop task.
    fn spawn_discovery_loop(&self) {
        let running = Arc::clone(&self.running);
        let store = Arc::clone(&self.store);
        let source = Arc::clone(&self.source);
        let interval = self.config.discovery_poll_interval_ms;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("discovery loop started");
            loop {
                if let Err(e) = Self::discover_once(&store, &source).await {
                    if Self::handle_loop_error("discovery", e, &running) {
                        break;
                    }
                }
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep(Duration::from_millis(interval)) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                    }
                }
            }
            info!("discovery loop stopped");
        });
    }

    /// Spawn the archive loop task.
    fn spawn_archive_loop(&self) {
        let running = Arc::clone(&self.running);
        let paused = Arc::clone(&self.paused);
        let acknowledged_failures = Arc::clone(&self.acknowledged_failures);
        let store = Arc::clone(&self.store);
        let source = Arc::clone(&self.source);
        let extractor = Arc::clone(&self.extractor);
        let budget = Arc::clone(&self.budget);
        let policy = self.policy.clone();
        let config = self.config.clone();
        let work_dir = self.work_dir.clone();
        let download_semaphore = Arc::clone(&self.download_semaphore);
        let extract_semaphore = Arc::clone(&self.extract_semaphore);
        let active_archives = Arc::clone(&self.active_archives);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("archive loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep(Duration::from_millis(config.archive_poll_interval_ms)) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }

                        if let Err(e) = Self::admit_downloads(
                            &store, &source, &extractor, &budget, &policy, &config,
                            &work_dir, &download_semaphore, &active_archives, &paused,
                        ).await {
                            if Self::handle_loop_error("download admission", e, &running) {
                                break;
                            }
                        }

                        if let Err(e) = Self::admit_extractions(
                            &store, &extractor, &budget, &policy, &config,
                            &work_dir, &extract_semaphore, &active_archives, &paused,
                        ).await {
                            if Self::handle_loop_error("extraction admission", e, &running) {
                                break;
                            }
                        }

                        if let Err(e) = Self::finalize_archives(
                            &store, &budget, &config, &paused,
                        ).await {
                            if Self::handle_loop_error("finalize", e, &running) {
                                break;
                            }
                        }

                        Self::evaluate_pause(&store, &config, &paused, &acknowledged_failures);
                    }
                }
            }
            info!("archive loop stopped");
        });
    }

    /// Spawn the media loop task.
    fn spawn_media_loop(&self) {
        let running = Arc::clone(&self.running);
        let store = Arc::clone(&self.store);
        let pipeline = Arc::clone(&self.pipeline);
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("media loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep(Duration::from_millis(config.media_poll_interval_ms)) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        if let Err(e) = Self::advance_media(&store, &pipeline, &config).await {
                            if Self::handle_loop_error("media advance", e, &running) {
                                break;
                            }
                        }
                    }
                }
            }
            info!("media loop stopped");
        });
    }

    /// Handles an error escaping a loop tick. Per-unit failures never
    /// get here; state store failures are infrastructure and halt the
    /// whole run. Returns true when the run was halted.
    fn handle_loop_error(
        context: &str,
        error: OrchestratorError,
        running: &Arc<AtomicBool>,
    ) -> bool {
        match error {
            OrchestratorError::State(e) => {
                error!("{}: state store failure, halting run: {}", context, e);
                running.store(false, Ordering::SeqCst);
                true
            }
            other => {
                warn!("{}: {}", context, other);
                false
            }
        }
    }

    /// Records archives newly advertised by the source.
    async fn discover_once(
        store: &Arc<dyn StateStore>,
        source: &Arc<dyn ArchiveSource>,
    ) -> Result<(), OrchestratorError> {
        let available = source.list_available().await?;
        for remote in available {
            if store.get_archive(&remote.id)?.is_some() {
                continue;
            }
            let record =
                ArchiveRecord::discovered(remote.id.clone(), remote.name.clone(), remote.size_bytes);
            store.upsert_archive(&record)?;
            metrics::ARCHIVES_DISCOVERED.inc();
            info!(
                "discovered archive {} ({} bytes)",
                remote.id, remote.size_bytes
            );
        }
        Ok(())
    }

    /// Admits discovered archives into the download pool, gated by the
    /// disk budget.
    #[allow(clippy::too_many_arguments)]
    async fn admit_downloads(
        store: &Arc<dyn StateStore>,
        source: &Arc<dyn ArchiveSource>,
        extractor: &Arc<dyn ArchiveExtractor>,
        budget: &Arc<DiskBudget>,
        policy: &RetryPolicy,
        config: &OrchestratorConfig,
        work_dir: &Path,
        semaphore: &Arc<Semaphore>,
        active_archives: &Arc<RwLock<HashSet<String>>>,
        paused: &Arc<AtomicBool>,
    ) -> Result<(), OrchestratorError> {
        if paused.load(Ordering::Relaxed) {
            return Ok(());
        }

        let candidates =
            store.list_archives_by_phase(ArchivePhase::Discovered, config.admission_batch)?;

        for record in candidates {
            if active_archives.read().await.contains(&record.id) {
                continue;
            }
            if !Self::retry_due(store, &record.id)? {
                continue;
            }

            match budget.admit(record.size_bytes) {
                Admission::Admitted => {
                    metrics::ADMISSIONS.with_label_values(&["admitted"]).inc();
                }
                Admission::Deferred {
                    requested,
                    available,
                } => {
                    metrics::ADMISSIONS.with_label_values(&["deferred"]).inc();
                    debug!(
                        "deferring download of {} ({} requested, {} available)",
                        record.id, requested, available
                    );
                    // Larger archives later in the list would not fit
                    // either once this one is blocked; try again next tick.
                    break;
                }
            }

            match store.transition_archive(
                &record.id,
                ArchivePhase::Discovered,
                ArchivePhase::Downloading,
            ) {
                Ok(()) => {}
                Err(StateError::Conflict { .. }) => {
                    budget.release(record.size_bytes);
                    continue;
                }
                Err(e) => {
                    budget.release(record.size_bytes);
                    return Err(e.into());
                }
            }

            active_archives.write().await.insert(record.id.clone());

            let store = Arc::clone(store);
            let source = Arc::clone(source);
            let extractor = Arc::clone(extractor);
            let budget = Arc::clone(budget);
            let policy = policy.clone();
            let dest_dir = work_dir.join("archives");
            let semaphore = Arc::clone(semaphore);
            let active_archives = Arc::clone(active_archives);

            tokio::spawn(async move {
                if let Err(e) = Self::download_archive(
                    &record, &store, &source, &extractor, &budget, &policy, &dest_dir, &semaphore,
                )
                .await
                {
                    error!("state store failure downloading {}: {}", record.id, e);
                }
                active_archives.write().await.remove(&record.id);
            });
        }

        Ok(())
    }

    /// Downloads one archive: fetch, verify integrity, fingerprint.
    #[allow(clippy::too_many_arguments)]
    async fn download_archive(
        record: &ArchiveRecord,
        store: &Arc<dyn StateStore>,
        source: &Arc<dyn ArchiveSource>,
        extractor: &Arc<dyn ArchiveExtractor>,
        budget: &Arc<DiskBudget>,
        policy: &RetryPolicy,
        dest_dir: &Path,
        semaphore: &Arc<Semaphore>,
    ) -> Result<(), StateError> {
        let _permit = match semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => return Ok(()),
        };

        let timer = metrics::ARCHIVE_STAGE_DURATION
            .with_label_values(&["download"])
            .start_timer();

        let fetched = match source.fetch(&record.id, dest_dir).await {
            Ok(fetched) => fetched,
            Err(e) => {
                timer.observe_duration();
                budget.release(record.size_bytes);
                metrics::ARCHIVE_OUTCOMES
                    .with_label_values(&["download", "failure"])
                    .inc();
                return Self::handle_archive_failure(
                    store,
                    policy,
                    &record.id,
                    ArchivePhase::Downloading,
                    &e.to_string(),
                    e.kind(),
                );
            }
        };
        timer.observe_duration();

        // The fetched bytes are on disk now regardless of what the
        // integrity check says; account for them.
        budget.commit(record.size_bytes, fetched.size_bytes);

        if let Err(e) = extractor.verify(&fetched.path).await {
            metrics::ARCHIVE_OUTCOMES
                .with_label_values(&["download", "corrupt"])
                .inc();
            return Self::handle_archive_failure(
                store,
                policy,
                &record.id,
                ArchivePhase::Downloading,
                &e.to_string(),
                e.kind(),
            );
        }

        if let Some(previous) = &record.fingerprint {
            if previous != &fetched.fingerprint {
                info!(
                    "archive {} was re-acquired with different content, reprocessing",
                    record.id
                );
            }
        }

        let mut updated = record.clone();
        updated.fingerprint = Some(fetched.fingerprint);
        updated.local_path = Some(fetched.path.to_string_lossy().to_string());
        updated.phase = ArchivePhase::Downloading;
        updated.updated_at = Utc::now();
        store.upsert_archive(&updated)?;

        store.transition_archive(&record.id, ArchivePhase::Downloading, ArchivePhase::Downloaded)?;
        store.clear_retry(&record.id)?;
        metrics::ARCHIVE_OUTCOMES
            .with_label_values(&["download", "success"])
            .inc();
        info!("downloaded archive {} ({} bytes)", record.id, fetched.size_bytes);
        Ok(())
    }

    /// Admits downloaded archives into the extraction pool.
    #[allow(clippy::too_many_arguments)]
    async fn admit_extractions(
        store: &Arc<dyn StateStore>,
        extractor: &Arc<dyn ArchiveExtractor>,
        budget: &Arc<DiskBudget>,
        policy: &RetryPolicy,
        config: &OrchestratorConfig,
        work_dir: &Path,
        semaphore: &Arc<Semaphore>,
        active_archives: &Arc<RwLock<HashSet<String>>>,
        paused: &Arc<AtomicBool>,
    ) -> Result<(), OrchestratorError> {
        if paused.load(Ordering::Relaxed) {
            return Ok(());
        }

        let candidates =
            store.list_archives_by_phase(ArchivePhase::Downloaded, config.admission_batch)?;

        for record in candidates {
            if active_archives.read().await.contains(&record.id) {
                continue;
            }
            if !Self::retry_due(store, &record.id)? {
                continue;
            }

            let estimate = (record.size_bytes as f64 * config.extract_size_factor) as u64;
            match budget.admit(estimate) {
                Admission::Admitted => {
                    metrics::ADMISSIONS.with_label_values(&["admitted"]).inc();
                }
                Admission::Deferred { .. } => {
                    metrics::ADMISSIONS.with_label_values(&["deferred"]).inc();
                    debug!("deferring extraction of {}", record.id);
                    break;
                }
            }

            match store.transition_archive(
                &record.id,
                ArchivePhase::Downloaded,
                ArchivePhase::Extracting,
            ) {
                Ok(()) => {}
                Err(StateError::Conflict { .. }) => {
                    budget.release(estimate);
                    continue;
                }
                Err(e) => {
                    budget.release(estimate);
                    return Err(e.into());
                }
            }

            active_archives.write().await.insert(record.id.clone());

            let store = Arc::clone(store);
            let extractor = Arc::clone(extractor);
            let budget = Arc::clone(budget);
            let policy = policy.clone();
            let work_dir = work_dir.to_path_buf();
            let semaphore = Arc::clone(semaphore);
            let active_archives = Arc::clone(active_archives);

            tokio::spawn(async move {
                if let Err(e) = Self::extract_archive(
                    &record, &store, &extractor, &budget, &policy, &work_dir, estimate, &semaphore,
                )
                .await
                {
                    error!("state store failure extracting {}: {}", record.id, e);
                }
                active_archives.write().await.remove(&record.id);
            });
        }

        Ok(())
    }

    /// Extracts one archive and fans its contents out into individually
    /// tracked media items.
    #[allow(clippy::too_many_arguments)]
    async fn extract_archive(
        record: &ArchiveRecord,
        store: &Arc<dyn StateStore>,
        extractor: &Arc<dyn ArchiveExtractor>,
        budget: &Arc<DiskBudget>,
        policy: &RetryPolicy,
        work_dir: &Path,
        estimate: u64,
        semaphore: &Arc<Semaphore>,
    ) -> Result<(), StateError> {
        let _permit = match semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => return Ok(()),
        };

        let Some(local_path) = record.local_path.clone() else {
            budget.release(estimate);
            return Self::handle_archive_failure(
                store,
                policy,
                &record.id,
                ArchivePhase::Extracting,
                "archive record has no local path",
                FailureKind::Permanent,
            );
        };

        let dest = work_dir.join("extracted").join(&record.id);
        let timer = metrics::ARCHIVE_STAGE_DURATION
            .with_label_values(&["extract"])
            .start_timer();
        let extraction = extractor.extract(Path::new(&local_path), &dest).await;
        timer.observe_duration();

        let entries = match extraction {
            Ok(entries) => entries,
            Err(e) => {
                // Whatever landed before the failure is found by the
                // next usage refresh; drop the reservation.
                budget.release(estimate);
                let result = if e.kind() == FailureKind::CorruptInput {
                    metrics::ARCHIVE_OUTCOMES
                        .with_label_values(&["extract", "corrupt"])
                        .inc();
                    "corrupt"
                } else {
                    metrics::ARCHIVE_OUTCOMES
                        .with_label_values(&["extract", "failure"])
                        .inc();
                    "failure"
                };
                debug!("extraction of {} ended in {}", record.id, result);
                return Self::handle_archive_failure(
                    store,
                    policy,
                    &record.id,
                    ArchivePhase::Extracting,
                    &e.to_string(),
                    e.kind(),
                );
            }
        };

        // Fingerprint media files with bounded concurrency, then record
        // them. Items already known by fingerprint (a previous partial
        // extraction, or identical content in another archive) are not
        // tracked twice.
        let media_entries: Vec<_> = entries
            .iter()
            .filter(|e| is_media_path(&e.relative_path))
            .collect();

        let fingerprint_jobs: Vec<(PathBuf, u64)> = media_entries
            .iter()
            .map(|entry| (dest.join(&entry.relative_path), entry.size_bytes))
            .collect();

        let fingerprints: Vec<Result<(PathBuf, u64, String), std::io::Error>> =
            stream::iter(fingerprint_jobs.into_iter().map(|(absolute, size_bytes)| {
                async move {
                    let fingerprint = file_fingerprint(&absolute).await?;
                    Ok((absolute, size_bytes, fingerprint))
                }
            }))
            .buffer_unordered(FINGERPRINT_CONCURRENCY)
            .collect()
            .await;

        let mut total_bytes = 0u64;
        let mut created = 0usize;
        for result in fingerprints {
            let (absolute, size_bytes, fingerprint) = match result {
                Ok(parts) => parts,
                Err(e) => {
                    budget.commit(estimate, total_bytes);
                    metrics::ARCHIVE_OUTCOMES
                        .with_label_values(&["extract", "failure"])
                        .inc();
                    return Self::handle_archive_failure(
                        store,
                        policy,
                        &record.id,
                        ArchivePhase::Extracting,
                        &format!("failed to fingerprint extracted file: {}", e),
                        FailureKind::Transient,
                    );
                }
            };
            total_bytes += size_bytes;

            if let Some(existing) = store.find_media_by_fingerprint(&fingerprint)? {
                debug!(
                    "skipping {} (content already tracked as {})",
                    absolute.display(),
                    existing.id
                );
                continue;
            }

            let item = MediaRecord::extracted(
                record.id.clone(),
                absolute.to_string_lossy().to_string(),
                fingerprint,
                size_bytes,
            );
            store.upsert_media(&item)?;
            created += 1;
        }

        let mut updated = record.clone();
        updated.extracted_path = Some(dest.to_string_lossy().to_string());
        updated.phase = ArchivePhase::Extracting;
        updated.updated_at = Utc::now();
        store.upsert_archive(&updated)?;

        store.transition_archive(&record.id, ArchivePhase::Extracting, ArchivePhase::Extracted)?;
        store.clear_retry(&record.id)?;
        budget.commit(estimate, total_bytes);
        metrics::ARCHIVE_OUTCOMES
            .with_label_values(&["extract", "success"])
            .inc();
        info!(
            "extracted archive {}: {} media items ({} new)",
            record.id,
            media_entries.len(),
            created
        );
        Ok(())
    }

    /// Feeds pending media items into the pipeline.
    async fn advance_media(
        store: &Arc<dyn StateStore>,
        pipeline: &Arc<MediaPipeline<T, U>>,
        config: &OrchestratorConfig,
    ) -> Result<(), OrchestratorError> {
        for phase in [
            MediaPhase::Extracted,
            MediaPhase::MetadataMerged,
            MediaPhase::AlbumResolved,
        ] {
            for item in store.list_media_by_phase(phase, config.admission_batch)? {
                if !Self::retry_due(store, &item.id)? {
                    continue;
                }
                match pipeline.process(item).await {
                    Ok(()) => {}
                    Err(PipelineError::ItemActive(_)) => {}
                    Err(PipelineError::NotRunning) => return Ok(()),
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(())
    }

    /// Marks archives whose items are all terminal as processed, and
    /// cleans up archives whose items are all uploaded.
    async fn finalize_archives(
        store: &Arc<dyn StateStore>,
        budget: &Arc<DiskBudget>,
        config: &OrchestratorConfig,
        paused: &Arc<AtomicBool>,
    ) -> Result<(), OrchestratorError> {
        for record in store.list_archives_by_phase(ArchivePhase::Extracted, config.admission_batch)?
        {
            let items = store.list_media_for_archive(&record.id)?;
            if items.iter().all(|i| i.phase.is_terminal()) {
                match store.transition_archive(
                    &record.id,
                    ArchivePhase::Extracted,
                    ArchivePhase::Processed,
                ) {
                    Ok(()) => info!("archive {} fully processed", record.id),
                    Err(StateError::Conflict { .. }) => continue,
                    Err(e) => return Err(e.into()),
                }
            }
        }

        if !config.cleanup_enabled || paused.load(Ordering::Relaxed) {
            return Ok(());
        }

        for record in store.list_archives_by_phase(ArchivePhase::Processed, config.admission_batch)?
        {
            let items = store.list_media_for_archive(&record.id)?;
            // Cleanup destroys the data a retry or an operator decision
            // would need: only archives whose every item is uploaded are
            // eligible. Anything with failed items stays Processed.
            if !items.iter().all(|i| i.phase == MediaPhase::Uploaded) {
                continue;
            }

            let mut reclaimed = 0u64;
            if let Some(local_path) = &record.local_path {
                let path = Path::new(local_path);
                if let Ok(metadata) = tokio::fs::metadata(path).await {
                    reclaimed += metadata.len();
                }
                if let Err(e) = tokio::fs::remove_file(path).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!("failed to remove archive file {}: {}", local_path, e);
                        continue;
                    }
                }
            }
            if let Some(extracted_path) = &record.extracted_path {
                let path = Path::new(extracted_path);
                reclaimed += dir_size(path);
                if let Err(e) = tokio::fs::remove_dir_all(path).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!("failed to remove extracted dir {}: {}", extracted_path, e);
                        continue;
                    }
                }
            }

            budget.reclaim(reclaimed);
            match store.transition_archive(&record.id, ArchivePhase::Processed, ArchivePhase::Cleaned)
            {
                Ok(()) => {
                    metrics::ARCHIVE_OUTCOMES
                        .with_label_values(&["cleanup", "success"])
                        .inc();
                    info!("cleaned archive {} ({} bytes reclaimed)", record.id, reclaimed);
                }
                Err(StateError::Conflict { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    /// Enters the paused-for-retries mode when the permanent-failure
    /// fraction crosses the threshold. Never unpauses automatically;
    /// that takes an explicit operator `proceed`.
    fn evaluate_pause(
        store: &Arc<dyn StateStore>,
        config: &OrchestratorConfig,
        paused: &Arc<AtomicBool>,
        acknowledged_failures: &Arc<AtomicU64>,
    ) {
        let (failed, uploaded) = match (
            store.count_media_by_phase(MediaPhase::Failed),
            store.count_media_by_phase(MediaPhase::Uploaded),
        ) {
            (Ok(failed), Ok(uploaded)) => (failed, uploaded),
            _ => return,
        };

        if failed <= acknowledged_failures.load(Ordering::Relaxed) {
            return;
        }
        let terminal = failed + uploaded;
        if terminal < config.pause_min_items {
            return;
        }

        let fraction = failed as f32 / terminal as f32;
        if fraction > config.pause_failure_threshold
            && !paused.swap(true, Ordering::SeqCst)
        {
            metrics::PAUSES_TRIGGERED.inc();
            warn!(
                "pausing for operator attention: {}/{} terminal items failed ({:.0}% > {:.0}%)",
                failed,
                terminal,
                fraction * 100.0,
                config.pause_failure_threshold * 100.0
            );
        }
    }

    /// Returns true if the unit has no pending retry or its retry is due.
    fn retry_due(store: &Arc<dyn StateStore>, unit_id: &str) -> Result<bool, StateError> {
        match store.get_retry(unit_id)? {
            Some(retry) => Ok(retry.is_due(Utc::now())),
            None => Ok(true),
        }
    }

    /// Records an archive failure and decides its fate: corrupt input
    /// parks in `Corrupted`, transient failures reset to the preceding
    /// phase under backoff, the rest convert to `Failed`.
    fn handle_archive_failure(
        store: &Arc<dyn StateStore>,
        policy: &RetryPolicy,
        archive_id: &str,
        owned_phase: ArchivePhase,
        message: &str,
        kind: FailureKind,
    ) -> Result<(), StateError> {
        if kind == FailureKind::CorruptInput {
            store.record_archive_failure(archive_id, message, kind)?;
            store.transition_archive(archive_id, owned_phase, ArchivePhase::Corrupted)?;
            store.clear_retry(archive_id)?;
            warn!(
                "archive {} has corrupt source bytes, needs re-acquisition or skip: {}",
                archive_id, message
            );
            return Ok(());
        }

        let attempts = store
            .get_archive(archive_id)?
            .map(|r| r.attempts + 1)
            .unwrap_or(1);
        let decision = policy.decide(kind, attempts);
        let effective_kind = match decision {
            RetryDecision::Exhausted => FailureKind::Permanent,
            _ => kind,
        };
        store.record_archive_failure(archive_id, message, effective_kind)?;

        match decision {
            RetryDecision::RetryAfter(delay) => {
                let target = owned_phase.reset_target().unwrap_or(ArchivePhase::Discovered);
                store.transition_archive(archive_id, owned_phase, target)?;
                let now = Utc::now();
                store.put_retry(&RetryRecord {
                    unit_id: archive_id.to_string(),
                    kind,
                    attempts,
                    next_retry_at: now + chrono::Duration::milliseconds(delay.as_millis() as i64),
                    resume_phase: target.as_str().to_string(),
                    scheduled_at: now,
                })?;
                metrics::RETRIES_SCHEDULED
                    .with_label_values(&[kind.as_str()])
                    .inc();
                warn!(
                    "archive {} failed ({}), retry {} scheduled in {:?}: {}",
                    archive_id, kind, attempts, delay, message
                );
            }
            RetryDecision::Exhausted | RetryDecision::NotRetryable => {
                store.transition_archive(archive_id, owned_phase, ArchivePhase::Failed)?;
                store.clear_retry(archive_id)?;
                warn!(
                    "archive {} failed permanently after {} attempts: {}",
                    archive_id, attempts, message
                );
            }
        }
        Ok(())
    }
}

/// Returns true for file extensions tracked as media items.
fn is_media_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| MEDIA_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Sums regular file sizes under `root`.
fn dir_size(root: &Path) -> u64 {
    let mut total = 0u64;
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                stack.push(entry.path());
            } else if file_type.is_file() {
                if let Ok(metadata) = entry.metadata() {
                    total = total.saturating_add(metadata.len());
                }
            }
        }
    }
    total
}
