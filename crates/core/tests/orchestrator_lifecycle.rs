//! Orchestrator lifecycle integration tests.
//!
//! These tests verify the complete archive lifecycle through the
//! orchestrator: discovered -> downloading -> downloaded -> extracting
//! -> extracted -> (per-item merge/resolve/upload) -> processed ->
//! cleaned, plus corruption, retry, pause and resumption behavior.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use porter_core::{
    testing::{MockArchiveSource, MockExtractor, MockTagger, MockUploader},
    ArchivePhase, ArchiveRecord, DiskBudget, DiskBudgetConfig, MediaPhase, MediaPipeline,
    MediaRecord, OrchestratorConfig, PipelineConfig, PipelineOrchestrator, RetryPolicy,
    SourceError, SqliteStateStore, StateStore,
};

/// Test helper wiring every dependency for orchestrator testing.
struct TestHarness {
    store: Arc<SqliteStateStore>,
    source: Arc<MockArchiveSource>,
    extractor: Arc<MockExtractor>,
    tagger: MockTagger,
    uploader: MockUploader,
    work_dir: PathBuf,
    budget_ceiling: Option<u64>,
    _db_dir: TempDir,
    _work_dir: TempDir,
}

impl TestHarness {
    async fn new() -> Self {
        let db_dir = TempDir::new().expect("Failed to create db dir");
        let work_dir = TempDir::new().expect("Failed to create work dir");
        let store = Arc::new(
            SqliteStateStore::new(&db_dir.path().join("test.db"))
                .expect("Failed to create state store"),
        );

        Self {
            store,
            source: Arc::new(MockArchiveSource::new()),
            extractor: Arc::new(MockExtractor::new()),
            tagger: MockTagger::new(),
            uploader: MockUploader::new(),
            work_dir: work_dir.path().to_path_buf(),
            budget_ceiling: None,
            _db_dir: db_dir,
            _work_dir: work_dir,
        }
    }

    fn fast_retry_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 10,
            max_delay_ms: 50,
            jitter: 0.0,
        }
    }

    fn create_orchestrator(&self) -> PipelineOrchestrator<MockTagger, MockUploader> {
        let config = OrchestratorConfig {
            enabled: true,
            discovery_poll_interval_ms: 25,
            archive_poll_interval_ms: 25,
            media_poll_interval_ms: 25,
            max_concurrent_downloads: 2,
            max_concurrent_extractions: 2,
            admission_batch: 32,
            extract_size_factor: 1.0,
            cleanup_enabled: true,
            pause_failure_threshold: 0.5,
            pause_min_items: 3,
        };

        let pipeline = Arc::new(MediaPipeline::new(
            PipelineConfig {
                max_parallel_merges: 2,
                max_parallel_uploads: 4,
            },
            Arc::clone(&self.store) as Arc<dyn StateStore>,
            self.tagger.clone(),
            self.uploader.clone(),
            Self::fast_retry_policy(),
        ));

        let budget = Arc::new(DiskBudget::new(
            DiskBudgetConfig {
                ceiling_bytes: self.budget_ceiling,
                refresh_interval_ms: 50,
            },
            &self.work_dir,
        ));

        PipelineOrchestrator::new(
            config,
            Arc::clone(&self.store) as Arc<dyn StateStore>,
            Arc::clone(&self.source) as _,
            Arc::clone(&self.extractor) as _,
            pipeline,
            budget,
            Self::fast_retry_policy(),
            &self.work_dir,
        )
    }

    /// Registers an archive at the source together with the contents
    /// the extractor will produce for it.
    async fn add_archive(&self, name: &str, content: &[u8], files: Vec<(&str, &[u8])>) {
        self.source.add_archive(name, content.to_vec()).await;
        self.extractor
            .set_contents(
                name,
                files
                    .into_iter()
                    .map(|(path, bytes)| (PathBuf::from(path), bytes.to_vec()))
                    .collect(),
            )
            .await;
    }

    async fn wait_for_archive_phase(
        &self,
        id: &str,
        expected: ArchivePhase,
        timeout: Duration,
    ) -> bool {
        let start = std::time::Instant::now();
        while start.elapsed() < timeout {
            if let Some(record) = self.store.get_archive(id).unwrap() {
                if record.phase == expected {
                    return true;
                }
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        false
    }

    async fn wait_for_media_counts(
        &self,
        uploaded: u64,
        failed: u64,
        timeout: Duration,
    ) -> bool {
        let start = std::time::Instant::now();
        while start.elapsed() < timeout {
            let current_uploaded = self.store.count_media_by_phase(MediaPhase::Uploaded).unwrap();
            let current_failed = self.store.count_media_by_phase(MediaPhase::Failed).unwrap();
            if current_uploaded == uploaded && current_failed == failed {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        false
    }
}

const WAIT: Duration = Duration::from_secs(10);

#[tokio::test]
async fn test_full_archive_lifecycle() {
    let harness = TestHarness::new().await;
    harness
        .add_archive(
            "takeout-001.zip",
            b"zip bytes for takeout 1",
            vec![
                ("Family/IMG_001.jpg", b"jpeg one".as_slice()),
                (
                    "Family/IMG_001.jpg.json",
                    br#"{"photoTakenTime":{"timestamp":"1560000000"},"description":"boat"}"#
                        .as_slice(),
                ),
                ("Family/IMG_002.jpg", b"jpeg two".as_slice()),
            ],
        )
        .await;

    let orchestrator = harness.create_orchestrator();
    orchestrator.start().await;

    assert!(
        harness
            .wait_for_archive_phase("takeout-001.zip", ArchivePhase::Cleaned, WAIT)
            .await,
        "archive never reached cleaned"
    );
    orchestrator.stop().await;

    // Both media files uploaded, the sidecar was not tracked as media.
    let uploads = harness.uploader.recorded_uploads().await;
    assert_eq!(uploads.len(), 2);
    for upload in &uploads {
        assert_eq!(upload.albums, vec!["Family".to_string()]);
    }

    // Sidecar metadata flowed into the tagger for IMG_001.
    let tags = harness.tagger.recorded_tags().await;
    let tagged_one = tags
        .iter()
        .find(|t| t.media_path.ends_with("IMG_001.jpg"))
        .expect("IMG_001 was never tagged");
    assert_eq!(tagged_one.metadata.description.as_deref(), Some("boat"));
    assert!(tagged_one.metadata.taken_at.is_some());

    // Cleanup removed the fetched archive and the extracted tree.
    let archive = harness
        .store
        .get_archive("takeout-001.zip")
        .unwrap()
        .unwrap();
    assert!(!PathBuf::from(archive.local_path.unwrap()).exists());
    assert!(!PathBuf::from(archive.extracted_path.unwrap()).exists());
}

#[tokio::test]
async fn test_corrupt_archive_parks_without_extraction() {
    let harness = TestHarness::new().await;
    harness
        .add_archive("bad.zip", b"damaged bytes", vec![("x.jpg", b"x".as_slice())])
        .await;
    harness.extractor.mark_corrupt("bad.zip").await;

    let orchestrator = harness.create_orchestrator();
    orchestrator.start().await;

    assert!(
        harness
            .wait_for_archive_phase("bad.zip", ArchivePhase::Corrupted, WAIT)
            .await,
        "corrupt archive never parked"
    );
    orchestrator.stop().await;

    // Corrupt input is never extracted and never silently retried.
    assert_eq!(harness.extractor.extract_count().await, 0);
    let record = harness.store.get_archive("bad.zip").unwrap().unwrap();
    assert!(record.last_error.unwrap().contains("corrupt"));

    tokio::time::sleep(Duration::from_millis(200)).await;
    let record = harness.store.get_archive("bad.zip").unwrap().unwrap();
    assert_eq!(record.phase, ArchivePhase::Corrupted);
}

#[tokio::test]
async fn test_transient_download_failure_is_retried() {
    let harness = TestHarness::new().await;
    harness
        .add_archive(
            "flaky.zip",
            b"archive bytes",
            vec![("Album/pic.jpg", b"pic".as_slice())],
        )
        .await;
    harness
        .source
        .set_next_fetch_error(SourceError::unavailable("connection reset"))
        .await;

    let orchestrator = harness.create_orchestrator();
    orchestrator.start().await;

    assert!(
        harness
            .wait_for_archive_phase("flaky.zip", ArchivePhase::Cleaned, WAIT)
            .await,
        "archive never recovered from the transient failure"
    );
    orchestrator.stop().await;

    assert!(harness.source.fetch_count().await >= 2);
    let record = harness.store.get_archive("flaky.zip").unwrap().unwrap();
    assert!(record.attempts >= 1);
    // The retry record is cleared on success.
    assert!(harness.store.get_retry("flaky.zip").unwrap().is_none());
}

#[tokio::test]
async fn test_sibling_failure_blocks_cleanup_not_uploads() {
    let harness = TestHarness::new().await;
    harness
        .add_archive(
            "takeout-002.zip",
            b"zip bytes for takeout 2",
            vec![
                ("Trip/one.jpg", b"one".as_slice()),
                ("Trip/two.jpg", b"two".as_slice()),
                ("Trip/three.jpg", b"three".as_slice()),
            ],
        )
        .await;
    harness.uploader.reject_file("two.jpg").await;

    let orchestrator = harness.create_orchestrator();
    orchestrator.start().await;

    assert!(
        harness.wait_for_media_counts(2, 1, WAIT).await,
        "expected 2 uploaded and 1 failed"
    );
    assert!(
        harness
            .wait_for_archive_phase("takeout-002.zip", ArchivePhase::Processed, WAIT)
            .await,
        "archive never reached processed"
    );

    // Give cleanup a chance to (wrongly) run, then check it did not.
    tokio::time::sleep(Duration::from_millis(300)).await;
    orchestrator.stop().await;

    let record = harness
        .store
        .get_archive("takeout-002.zip")
        .unwrap()
        .unwrap();
    assert_eq!(record.phase, ArchivePhase::Processed);
    // The source data for the failed item survives for a manual retry.
    assert!(PathBuf::from(record.extracted_path.unwrap()).exists());

    let failed = harness.store.list_media_by_phase(MediaPhase::Failed, 10).unwrap();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].source_path.ends_with("two.jpg"));
}

#[tokio::test]
async fn test_retry_budget_converts_to_permanent() {
    let harness = TestHarness::new().await;
    harness
        .add_archive(
            "takeout-003.zip",
            b"zip bytes for takeout 3",
            vec![("Pics/only.jpg", b"only".as_slice())],
        )
        .await;
    // More rate-limit failures than the 3-attempt budget.
    harness.uploader.fail_next_with_rate_limit(100).await;

    let orchestrator = harness.create_orchestrator();
    orchestrator.start().await;

    assert!(
        harness.wait_for_media_counts(0, 1, WAIT).await,
        "item never converted to permanent failure"
    );
    orchestrator.stop().await;

    let failed = &harness.store.list_media_by_phase(MediaPhase::Failed, 10).unwrap()[0];
    assert_eq!(failed.attempts, 3);
    assert_eq!(
        failed.last_error_kind,
        Some(porter_core::FailureKind::Permanent)
    );
    // Upload was invoked exactly once per allowed attempt, then never again.
    assert_eq!(harness.uploader.call_count().await, 3);
}

#[tokio::test]
async fn test_albums_merge_case_insensitively_across_archives() {
    let harness = TestHarness::new().await;
    harness
        .add_archive(
            "first.zip",
            b"first archive bytes",
            vec![("Family/a.jpg", b"content a".as_slice())],
        )
        .await;
    harness
        .add_archive(
            "second.zip",
            b"second archive bytes",
            vec![("family/b.jpg", b"content b".as_slice())],
        )
        .await;

    let orchestrator = harness.create_orchestrator();
    orchestrator.start().await;

    assert!(harness.wait_for_media_counts(2, 0, WAIT).await);
    orchestrator.stop().await;

    let albums = harness.store.list_albums().unwrap();
    assert_eq!(albums.len(), 1, "expected one album, got {:?}", albums);
    assert_eq!(albums[0].display_name, "Family");
    assert_eq!(
        harness
            .store
            .album_members(&albums[0].canonical_key)
            .unwrap()
            .len(),
        2
    );
}

#[tokio::test]
async fn test_restart_readmits_only_pending_items() {
    let harness = TestHarness::new().await;

    // A previous run left an extracted archive with 100 items, 40 of
    // them already durably uploaded.
    let mut archive = ArchiveRecord::discovered("resumed.zip", "resumed.zip", 1_000);
    archive.phase = ArchivePhase::Extracted;
    harness.store.upsert_archive(&archive).unwrap();

    for i in 0..100 {
        let mut item = MediaRecord::extracted(
            "resumed.zip",
            format!("/phantom/resumed/pic_{:03}.jpg", i),
            format!("fingerprint-{:03}", i),
            10,
        );
        if i < 40 {
            item.phase = MediaPhase::Uploaded;
            item.remote_id = Some(format!("remote-old-{}", i));
        } else {
            item.phase = MediaPhase::AlbumResolved;
        }
        harness.store.upsert_media(&item).unwrap();
    }

    let orchestrator = harness.create_orchestrator();
    orchestrator.start().await;

    assert!(
        harness.wait_for_media_counts(100, 0, WAIT).await,
        "remaining items never finished"
    );
    orchestrator.stop().await;

    // Only the 60 pending items were ever handed to the uploader.
    assert_eq!(harness.uploader.call_count().await, 60);
}

#[tokio::test]
async fn test_pause_on_failure_fraction_and_proceed() {
    let harness = TestHarness::new().await;

    // Seed a run whose terminal items are mostly failures.
    let mut archive = ArchiveRecord::discovered("sad.zip", "sad.zip", 1_000);
    archive.phase = ArchivePhase::Extracted;
    harness.store.upsert_archive(&archive).unwrap();
    for i in 0..4 {
        let mut item = MediaRecord::extracted(
            "sad.zip",
            format!("/phantom/sad/{}.jpg", i),
            format!("sad-fp-{}", i),
            10,
        );
        item.phase = if i == 0 {
            MediaPhase::Uploaded
        } else {
            MediaPhase::Failed
        };
        harness.store.upsert_media(&item).unwrap();
    }

    let orchestrator = harness.create_orchestrator();
    orchestrator.start().await;

    // Pause state is derived from the store on startup.
    assert!(orchestrator.is_paused());
    let status = orchestrator.status().await.unwrap();
    assert!(status.paused_for_retries);
    assert_eq!(status.media_failed, 3);

    // Paused: a new archive at the source is discovered but not admitted.
    harness
        .add_archive(
            "parked.zip",
            b"parked bytes",
            vec![("Pics/p.jpg", b"p".as_slice())],
        )
        .await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    let parked = harness.store.get_archive("parked.zip").unwrap().unwrap();
    assert_eq!(parked.phase, ArchivePhase::Discovered);

    // Explicit operator signal resumes automatic progress.
    orchestrator.proceed();
    assert!(!orchestrator.is_paused());
    assert!(
        harness
            .wait_for_archive_phase("parked.zip", ArchivePhase::Cleaned, WAIT)
            .await,
        "archive never processed after proceed"
    );
    orchestrator.stop().await;
}

#[tokio::test]
async fn test_disk_budget_defers_but_run_completes() {
    let mut harness = TestHarness::new().await;
    // Room for roughly one archive (bytes + extracted estimate) at a time.
    harness.budget_ceiling = Some(120);

    // Distinct contents per archive; identical bytes would be deduped
    // by fingerprint.
    harness
        .add_archive(
            "small-a.zip",
            &[b'a'; 40],
            vec![("Pics/one.jpg", b"pic-from-a".as_slice())],
        )
        .await;
    harness
        .add_archive(
            "small-b.zip",
            &[b'b'; 40],
            vec![("Pics/two.jpg", b"pic-from-b".as_slice())],
        )
        .await;

    let orchestrator = harness.create_orchestrator();
    orchestrator.start().await;

    for name in ["small-a.zip", "small-b.zip"] {
        assert!(
            harness
                .wait_for_archive_phase(name, ArchivePhase::Cleaned, WAIT)
                .await,
            "{} never completed under the budget",
            name
        );
    }
    orchestrator.stop().await;

    assert_eq!(harness.uploader.upload_count().await, 2);
}
