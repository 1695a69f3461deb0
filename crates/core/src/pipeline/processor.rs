//! Media pipeline implementation.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, error, info, warn};

use crate::album::AlbumResolver;
use crate::metrics;
use crate::retry::{FailureKind, RetryDecision, RetryPolicy, RetryRecord};
use crate::state::{MediaPhase, MediaRecord, StateError, StateStore};
use crate::tagger::{album_title_for_directory, load_sidecar, MediaMetadata, MetadataTagger};
use crate::uploader::MediaUploader;

use super::config::PipelineConfig;
use super::types::{PipelineStatus, PoolStats};

/// Error type for pipeline operations.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Pipeline is not running.
    #[error("pipeline is not running")]
    NotRunning,

    /// The item is already being driven by a pipeline task.
    #[error("item already active: {0}")]
    ItemActive(String),

    /// State store failure.
    #[error("state store error: {0}")]
    State(#[from] StateError),
}

/// Drives media items through merge -> resolve -> upload with bounded
/// concurrency per stage.
pub struct MediaPipeline<T, U>
where
    T: MetadataTagger + 'static,
    U: MediaUploader + 'static,
{
    config: PipelineConfig,
    store: Arc<dyn StateStore>,
    resolver: Arc<AlbumResolver>,
    tagger: Arc<T>,
    uploader: Arc<U>,
    policy: RetryPolicy,
    merge_semaphore: Arc<Semaphore>,
    upload_semaphore: Arc<Semaphore>,
    merge_stats: Arc<PoolStats>,
    upload_stats: Arc<PoolStats>,
    active_items: Arc<RwLock<HashSet<String>>>,
    running: Arc<AtomicBool>,
}

impl<T, U> MediaPipeline<T, U>
where
    T: MetadataTagger + 'static,
    U: MediaUploader + 'static,
{
    /// Creates a new media pipeline.
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn StateStore>,
        tagger: T,
        uploader: U,
        policy: RetryPolicy,
    ) -> Self {
        let merge_semaphore = Arc::new(Semaphore::new(config.max_parallel_merges));
        let upload_semaphore = Arc::new(Semaphore::new(config.max_parallel_uploads));
        let resolver = Arc::new(AlbumResolver::new(Arc::clone(&store)));

        Self {
            config,
            store,
            resolver,
            tagger: Arc::new(tagger),
            uploader: Arc::new(uploader),
            policy,
            merge_semaphore,
            upload_semaphore,
            merge_stats: Arc::new(PoolStats::default()),
            upload_stats: Arc::new(PoolStats::default()),
            active_items: Arc::new(RwLock::new(HashSet::new())),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Starts accepting items.
    pub fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    /// Stops accepting new items. In-flight items finish their current
    /// stage and park at the next durable checkpoint.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Returns the current pipeline status.
    pub async fn status(&self) -> PipelineStatus {
        PipelineStatus {
            running: self.running.load(Ordering::Relaxed),
            merge_pool: self
                .merge_stats
                .to_status("merge", self.config.max_parallel_merges),
            upload_pool: self
                .upload_stats
                .to_status("upload", self.config.max_parallel_uploads),
            active_items: self.active_items.read().await.len(),
        }
    }

    /// Number of items currently being driven.
    pub async fn active_count(&self) -> usize {
        self.active_items.read().await.len()
    }

    /// Submits one media item. Returns immediately; the item is driven
    /// from its current phase to its next parking point in the
    /// background.
    pub async fn process(&self, item: MediaRecord) -> Result<(), PipelineError> {
        if !self.running.load(Ordering::Relaxed) {
            return Err(PipelineError::NotRunning);
        }

        {
            let mut active = self.active_items.write().await;
            if !active.insert(item.id.clone()) {
                return Err(PipelineError::ItemActive(item.id));
            }
        }

        let store = Arc::clone(&self.store);
        let resolver = Arc::clone(&self.resolver);
        let tagger = Arc::clone(&self.tagger);
        let uploader = Arc::clone(&self.uploader);
        let policy = self.policy.clone();
        let merge_semaphore = Arc::clone(&self.merge_semaphore);
        let upload_semaphore = Arc::clone(&self.upload_semaphore);
        let merge_stats = Arc::clone(&self.merge_stats);
        let upload_stats = Arc::clone(&self.upload_stats);
        let active_items = Arc::clone(&self.active_items);
        let running = Arc::clone(&self.running);
        let item_id = item.id.clone();

        tokio::spawn(async move {
            if let Err(e) = Self::run_item(
                item,
                store,
                resolver,
                tagger,
                uploader,
                policy,
                merge_semaphore,
                upload_semaphore,
                merge_stats,
                upload_stats,
                running,
            )
            .await
            {
                // Only infrastructure errors propagate this far.
                error!("state store failure while processing {}: {}", item_id, e);
            }
            active_items.write().await.remove(&item_id);
        });

        Ok(())
    }

    /// Drives one item forward until it parks (terminal phase, retry
    /// scheduled, or shutdown).
    #[allow(clippy::too_many_arguments)]
    async fn run_item(
        item: MediaRecord,
        store: Arc<dyn StateStore>,
        resolver: Arc<AlbumResolver>,
        tagger: Arc<T>,
        uploader: Arc<U>,
        policy: RetryPolicy,
        merge_semaphore: Arc<Semaphore>,
        upload_semaphore: Arc<Semaphore>,
        merge_stats: Arc<PoolStats>,
        upload_stats: Arc<PoolStats>,
        running: Arc<AtomicBool>,
    ) -> Result<(), StateError> {
        let mut phase = item.phase;

        loop {
            if !running.load(Ordering::Relaxed) {
                debug!("pipeline stopping, parking item {} at {}", item.id, phase);
                return Ok(());
            }

            match phase {
                MediaPhase::Extracted => {
                    if !Self::merge_stage(&item, &store, &tagger, &policy, &merge_semaphore, &merge_stats)
                        .await?
                    {
                        return Ok(());
                    }
                    phase = MediaPhase::MetadataMerged;
                }
                MediaPhase::MetadataMerged => {
                    if !Self::resolve_stage(&item, &store, &resolver, &policy).await? {
                        return Ok(());
                    }
                    phase = MediaPhase::AlbumResolved;
                }
                MediaPhase::AlbumResolved => {
                    Self::upload_stage(&item, &store, &uploader, &policy, &upload_semaphore, &upload_stats)
                        .await?;
                    return Ok(());
                }
                _ => return Ok(()),
            }
        }
    }

    /// Merge stage: derive metadata from the sidecar and embed it.
    /// Returns true if the item advanced.
    async fn merge_stage(
        item: &MediaRecord,
        store: &Arc<dyn StateStore>,
        tagger: &Arc<T>,
        policy: &RetryPolicy,
        semaphore: &Arc<Semaphore>,
        stats: &Arc<PoolStats>,
    ) -> Result<bool, StateError> {
        stats.queued.fetch_add(1, Ordering::Relaxed);
        let _permit = match semaphore.acquire().await {
            Ok(permit) => {
                stats.queued.fetch_sub(1, Ordering::Relaxed);
                permit
            }
            Err(_) => {
                stats.queued.fetch_sub(1, Ordering::Relaxed);
                return Ok(false);
            }
        };
        stats.active.fetch_add(1, Ordering::Relaxed);

        let path = Path::new(&item.source_path);
        let result: Result<MediaMetadata, (String, FailureKind)> = async {
            let sidecar = load_sidecar(path)
                .await
                .map_err(|e| (e.to_string(), FailureKind::Transient))?;
            let metadata = sidecar.map(|s| s.to_metadata()).unwrap_or_default();
            tagger
                .apply(path, &metadata)
                .await
                .map_err(|e| (e.to_string(), e.kind()))?;
            Ok(metadata)
        }
        .await;

        stats.active.fetch_sub(1, Ordering::Relaxed);

        match result {
            Ok(metadata) => {
                store.set_media_metadata(&item.id, &metadata)?;
                match store.transition_media(&item.id, MediaPhase::Extracted, MediaPhase::MetadataMerged)
                {
                    Ok(()) => {}
                    Err(StateError::Conflict { actual, .. }) => {
                        debug!("skipping merge commit of {}: already {}", item.id, actual);
                        return Ok(false);
                    }
                    Err(e) => return Err(e),
                }
                store.clear_retry(&item.id)?;
                stats.total_processed.fetch_add(1, Ordering::Relaxed);
                metrics::MEDIA_OUTCOMES
                    .with_label_values(&["merge", "success"])
                    .inc();
                debug!("metadata merged for {}", item.id);
                Ok(true)
            }
            Err((message, kind)) => {
                stats.total_failed.fetch_add(1, Ordering::Relaxed);
                metrics::MEDIA_OUTCOMES
                    .with_label_values(&["merge", "failure"])
                    .inc();
                Self::handle_failure(store, policy, &item.id, MediaPhase::Extracted, None, &message, kind)?;
                Ok(false)
            }
        }
    }

    /// Album resolution stage. Returns true if the item advanced.
    async fn resolve_stage(
        item: &MediaRecord,
        store: &Arc<dyn StateStore>,
        resolver: &Arc<AlbumResolver>,
        policy: &RetryPolicy,
    ) -> Result<bool, StateError> {
        let path = Path::new(&item.source_path);
        let dir = path.parent().unwrap_or_else(|| Path::new(""));

        let hints = match album_title_for_directory(dir).await {
            Ok(title) => title.into_iter().collect::<Vec<_>>(),
            Err(e) => {
                Self::handle_failure(
                    store,
                    policy,
                    &item.id,
                    MediaPhase::MetadataMerged,
                    None,
                    &e.to_string(),
                    FailureKind::Transient,
                )?;
                metrics::MEDIA_OUTCOMES
                    .with_label_values(&["resolve", "failure"])
                    .inc();
                return Ok(false);
            }
        };

        let resolved = resolver.resolve(&item.id, path, &hints)?;
        for album in &resolved {
            if album.newly_created {
                metrics::ALBUMS_CREATED.inc();
            }
        }
        let names: Vec<String> = resolved
            .iter()
            .map(|a| a.record.display_name.clone())
            .collect();

        store.set_media_albums(&item.id, &names)?;
        match store.transition_media(&item.id, MediaPhase::MetadataMerged, MediaPhase::AlbumResolved) {
            Ok(()) => {}
            Err(StateError::Conflict { actual, .. }) => {
                debug!("skipping resolve commit of {}: already {}", item.id, actual);
                return Ok(false);
            }
            Err(e) => return Err(e),
        }
        store.clear_retry(&item.id)?;
        metrics::MEDIA_OUTCOMES
            .with_label_values(&["resolve", "success"])
            .inc();
        debug!("albums resolved for {}: {:?}", item.id, names);
        Ok(true)
    }

    /// Upload stage. The transition into `Uploading` is the at-most-once
    /// guard: a conflict means another worker (or a previous run)
    /// already owns the item, and upload is never invoked.
    async fn upload_stage(
        item: &MediaRecord,
        store: &Arc<dyn StateStore>,
        uploader: &Arc<U>,
        policy: &RetryPolicy,
        semaphore: &Arc<Semaphore>,
        stats: &Arc<PoolStats>,
    ) -> Result<(), StateError> {
        stats.queued.fetch_add(1, Ordering::Relaxed);
        let _permit = match semaphore.acquire().await {
            Ok(permit) => {
                stats.queued.fetch_sub(1, Ordering::Relaxed);
                permit
            }
            Err(_) => {
                stats.queued.fetch_sub(1, Ordering::Relaxed);
                return Ok(());
            }
        };

        match store.transition_media(&item.id, MediaPhase::AlbumResolved, MediaPhase::Uploading) {
            Ok(()) => {}
            Err(StateError::Conflict { actual, .. }) => {
                debug!("skipping upload of {}: already {}", item.id, actual);
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        stats.active.fetch_add(1, Ordering::Relaxed);
        // Reload: albums were written after the snapshot we hold.
        let albums = store
            .get_media(&item.id)?
            .map(|r| r.albums)
            .unwrap_or_default();

        let result = uploader.upload(Path::new(&item.source_path), &albums).await;
        stats.active.fetch_sub(1, Ordering::Relaxed);

        match result {
            Ok(receipt) => {
                store.set_media_remote_id(&item.id, &receipt.remote_id)?;
                store.transition_media(&item.id, MediaPhase::Uploading, MediaPhase::Uploaded)?;
                store.clear_retry(&item.id)?;
                stats.total_processed.fetch_add(1, Ordering::Relaxed);
                metrics::MEDIA_OUTCOMES
                    .with_label_values(&["upload", "success"])
                    .inc();
                metrics::MEDIA_UPLOADED.inc();
                info!("uploaded {} as {}", item.id, receipt.remote_id);
            }
            Err(e) => {
                stats.total_failed.fetch_add(1, Ordering::Relaxed);
                metrics::MEDIA_OUTCOMES
                    .with_label_values(&["upload", "failure"])
                    .inc();
                Self::handle_failure(
                    store,
                    policy,
                    &item.id,
                    MediaPhase::Uploading,
                    Some(MediaPhase::AlbumResolved),
                    &e.to_string(),
                    e.kind(),
                )?;
            }
        }
        Ok(())
    }

    /// Records a stage failure and decides the item's fate: scheduled
    /// retry (with the explicit reset to the phase preceding the
    /// failure) or conversion to the `Failed` absorbing phase.
    fn handle_failure(
        store: &Arc<dyn StateStore>,
        policy: &RetryPolicy,
        item_id: &str,
        owned_phase: MediaPhase,
        reset_to: Option<MediaPhase>,
        message: &str,
        kind: FailureKind,
    ) -> Result<(), StateError> {
        let attempts = store
            .get_media(item_id)?
            .map(|r| r.attempts + 1)
            .unwrap_or(1);

        let decision = policy.decide(kind, attempts);
        let effective_kind = match decision {
            RetryDecision::Exhausted => FailureKind::Permanent,
            _ => kind,
        };
        store.record_media_failure(item_id, message, effective_kind)?;

        match decision {
            RetryDecision::RetryAfter(delay) => {
                let resume = reset_to.unwrap_or(owned_phase);
                if let Some(target) = reset_to {
                    store.transition_media(item_id, owned_phase, target)?;
                }
                let now = Utc::now();
                store.put_retry(&RetryRecord {
                    unit_id: item_id.to_string(),
                    kind,
                    attempts,
                    next_retry_at: now + chrono::Duration::milliseconds(delay.as_millis() as i64),
                    resume_phase: resume.as_str().to_string(),
                    scheduled_at: now,
                })?;
                metrics::RETRIES_SCHEDULED
                    .with_label_values(&[kind.as_str()])
                    .inc();
                warn!(
                    "item {} failed ({}), retry {} scheduled in {:?}: {}",
                    item_id, kind, attempts, delay, message
                );
            }
            RetryDecision::Exhausted | RetryDecision::NotRetryable => {
                store.transition_media(item_id, owned_phase, MediaPhase::Failed)?;
                store.clear_retry(item_id)?;
                warn!(
                    "item {} failed permanently after {} attempts ({}): {}",
                    item_id, attempts, effective_kind, message
                );
            }
        }
        Ok(())
    }
}
