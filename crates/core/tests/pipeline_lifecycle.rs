//! Media pipeline integration tests.
//!
//! These tests drive individual media items through merge -> resolve ->
//! upload against real files on disk, without the orchestrator loops.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use porter_core::{
    testing::{MockTagger, MockUploader},
    FailureKind, MediaPhase, MediaPipeline, MediaRecord, PipelineConfig, RetryPolicy,
    SqliteStateStore, StateStore, TagError,
};

struct TestHarness {
    store: Arc<SqliteStateStore>,
    tagger: MockTagger,
    uploader: MockUploader,
    pipeline: MediaPipeline<MockTagger, MockUploader>,
    work_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        let store = Arc::new(SqliteStateStore::in_memory().unwrap());
        let tagger = MockTagger::new();
        let uploader = MockUploader::new();
        let pipeline = MediaPipeline::new(
            PipelineConfig {
                max_parallel_merges: 2,
                max_parallel_uploads: 2,
            },
            Arc::clone(&store) as Arc<dyn StateStore>,
            tagger.clone(),
            uploader.clone(),
            RetryPolicy {
                max_attempts: 3,
                base_delay_ms: 10,
                max_delay_ms: 50,
                jitter: 0.0,
            },
        );
        pipeline.start();

        Self {
            store,
            tagger,
            uploader,
            pipeline,
            work_dir: TempDir::new().unwrap(),
        }
    }

    /// Writes a media file (and optional sidecar) under the given album
    /// directory and registers it in the store at `Extracted`.
    async fn seed_item(
        &self,
        album_dir: &str,
        file_name: &str,
        sidecar_json: Option<&str>,
    ) -> MediaRecord {
        let dir = self.work_dir.path().join(album_dir);
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let media_path = dir.join(file_name);
        tokio::fs::write(&media_path, format!("bytes of {}", file_name))
            .await
            .unwrap();
        if let Some(json) = sidecar_json {
            tokio::fs::write(dir.join(format!("{}.json", file_name)), json)
                .await
                .unwrap();
        }

        let record = MediaRecord::extracted(
            "archive-1",
            media_path.to_string_lossy().to_string(),
            format!("fp-{}-{}", album_dir, file_name),
            16,
        );
        self.store.upsert_media(&record).unwrap();
        record
    }

    async fn wait_for_phase(&self, id: &str, expected: MediaPhase, timeout: Duration) -> bool {
        let start = std::time::Instant::now();
        while start.elapsed() < timeout {
            let record = self.store.get_media(id).unwrap().unwrap();
            if record.phase == expected {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_item_flows_through_all_stages() {
    let harness = TestHarness::new();
    let item = harness
        .seed_item(
            "Holiday",
            "IMG_100.jpg",
            Some(r#"{"photoTakenTime":{"timestamp":"1600000000"},"geoData":{"latitude":41.9,"longitude":12.5}}"#),
        )
        .await;

    harness.pipeline.process(item.clone()).await.unwrap();
    assert!(harness.wait_for_phase(&item.id, MediaPhase::Uploaded, WAIT).await);

    let finished = harness.store.get_media(&item.id).unwrap().unwrap();
    assert_eq!(finished.albums, vec!["Holiday".to_string()]);
    assert!(finished.remote_id.is_some());

    let metadata = finished.metadata.unwrap();
    assert_eq!(metadata.latitude, Some(41.9));
    assert!(metadata.taken_at.is_some());

    // The tagger saw the item once, the uploader saw it once with its album.
    assert_eq!(harness.tagger.tag_count().await, 1);
    let uploads = harness.uploader.recorded_uploads().await;
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].albums, vec!["Holiday".to_string()]);
}

#[tokio::test]
async fn test_year_folder_item_has_no_album() {
    let harness = TestHarness::new();
    let item = harness
        .seed_item("Photos from 2019", "IMG_200.jpg", None)
        .await;

    harness.pipeline.process(item.clone()).await.unwrap();
    assert!(harness.wait_for_phase(&item.id, MediaPhase::Uploaded, WAIT).await);

    let finished = harness.store.get_media(&item.id).unwrap().unwrap();
    assert!(finished.albums.is_empty());
    assert!(harness.store.list_albums().unwrap().is_empty());
}

#[tokio::test]
async fn test_upload_skipped_when_item_already_owned() {
    let harness = TestHarness::new();
    let item = harness.seed_item("Trip", "IMG_300.jpg", None).await;

    // Another worker (a previous run, say) already owns the upload.
    harness
        .store
        .transition_media(&item.id, MediaPhase::Extracted, MediaPhase::MetadataMerged)
        .unwrap();
    harness
        .store
        .transition_media(&item.id, MediaPhase::MetadataMerged, MediaPhase::AlbumResolved)
        .unwrap();
    harness
        .store
        .transition_media(&item.id, MediaPhase::AlbumResolved, MediaPhase::Uploading)
        .unwrap();

    let mut parked = item.clone();
    parked.phase = MediaPhase::AlbumResolved;
    harness.pipeline.process(parked).await.unwrap();

    // Let the task run; the CAS guard must refuse a second upload.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(harness.uploader.call_count().await, 0);
}

#[tokio::test]
async fn test_transient_upload_failure_resets_with_retry_record() {
    let harness = TestHarness::new();
    let item = harness.seed_item("Trip", "IMG_400.jpg", None).await;
    harness.uploader.fail_next_with_rate_limit(1).await;

    harness.pipeline.process(item.clone()).await.unwrap();

    // The item parks back at AlbumResolved with a scheduled retry.
    let start = std::time::Instant::now();
    let retry = loop {
        if let Some(retry) = harness.store.get_retry(&item.id).unwrap() {
            break retry;
        }
        assert!(start.elapsed() < WAIT, "retry record never appeared");
        tokio::time::sleep(Duration::from_millis(10)).await;
    };
    assert_eq!(retry.kind, FailureKind::Transient);
    assert_eq!(retry.attempts, 1);
    assert_eq!(retry.resume_phase, "album_resolved");

    let parked = harness.store.get_media(&item.id).unwrap().unwrap();
    assert_eq!(parked.phase, MediaPhase::AlbumResolved);
    assert_eq!(parked.attempts, 1);

    // A later pass (the orchestrator's media loop, here simulated)
    // finishes the upload and clears the retry.
    harness.pipeline.process(parked).await.unwrap();
    assert!(harness.wait_for_phase(&item.id, MediaPhase::Uploaded, WAIT).await);
    assert!(harness.store.get_retry(&item.id).unwrap().is_none());
}

#[tokio::test]
async fn test_permanent_merge_failure_fails_item() {
    let harness = TestHarness::new();
    let item = harness.seed_item("Trip", "IMG_500.jpg", None).await;
    harness
        .tagger
        .set_next_error(TagError::tool_failed("unwritable tag block", None))
        .await;

    harness.pipeline.process(item.clone()).await.unwrap();
    assert!(harness.wait_for_phase(&item.id, MediaPhase::Failed, WAIT).await);

    let failed = harness.store.get_media(&item.id).unwrap().unwrap();
    assert_eq!(failed.last_error_kind, Some(FailureKind::Permanent));
    assert!(failed.last_error.unwrap().contains("unwritable tag block"));
    // It never reached the uploader.
    assert_eq!(harness.uploader.call_count().await, 0);
}

#[tokio::test]
async fn test_resolving_twice_creates_no_duplicates() {
    let harness = TestHarness::new();
    let item = harness.seed_item("Wedding", "IMG_600.jpg", None).await;

    harness.pipeline.process(item.clone()).await.unwrap();
    assert!(harness.wait_for_phase(&item.id, MediaPhase::Uploaded, WAIT).await);

    // Simulate an operator-driven re-run of resolution for the item.
    let mut again = harness.store.get_media(&item.id).unwrap().unwrap();
    again.phase = MediaPhase::MetadataMerged;
    harness.store.upsert_media(&again).unwrap();
    harness.pipeline.process(again).await.unwrap();
    assert!(harness.wait_for_phase(&item.id, MediaPhase::Uploaded, WAIT).await);

    let albums = harness.store.list_albums().unwrap();
    assert_eq!(albums.len(), 1);
    assert_eq!(
        harness.store.album_members(&albums[0].canonical_key).unwrap(),
        vec![item.id.clone()]
    );
}
