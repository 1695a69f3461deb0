//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Orchestrator (discovery, downloads, extractions, cleanup, pauses)
//! - Media pipeline (merges, resolutions, uploads)
//! - Disk budget (admissions, deferrals)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Archive Metrics
// =============================================================================

/// Archives discovered at the source.
pub static ARCHIVES_DISCOVERED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "porter_archives_discovered_total",
        "Total archives discovered at the source",
    )
    .unwrap()
});

/// Archive phase outcomes by result.
pub static ARCHIVE_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("porter_archive_outcomes_total", "Archive stage outcomes"),
        &["stage", "result"], // stage: "download", "extract", "cleanup"; result: "success", "failure", "corrupt"
    )
    .unwrap()
});

/// Archive stage duration in seconds.
pub static ARCHIVE_STAGE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "porter_archive_stage_duration_seconds",
            "Duration of archive stages",
        )
        .buckets(vec![0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 3600.0]),
        &["stage"],
    )
    .unwrap()
});

// =============================================================================
// Media Pipeline Metrics
// =============================================================================

/// Media stage outcomes by result.
pub static MEDIA_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("porter_media_outcomes_total", "Media stage outcomes"),
        &["stage", "result"], // stage: "merge", "resolve", "upload"; result: "success", "failure"
    )
    .unwrap()
});

/// Media items uploaded.
pub static MEDIA_UPLOADED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "porter_media_uploaded_total",
        "Total media items durably uploaded",
    )
    .unwrap()
});

/// Albums created this process lifetime.
pub static ALBUMS_CREATED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("porter_albums_created_total", "Total albums created").unwrap()
});

// =============================================================================
// Retry and Budget Metrics
// =============================================================================

/// Retries scheduled, by failure kind.
pub static RETRIES_SCHEDULED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("porter_retries_scheduled_total", "Total retries scheduled"),
        &["kind"],
    )
    .unwrap()
});

/// Disk budget admission decisions.
pub static ADMISSIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "porter_budget_admissions_total",
            "Disk budget admission decisions",
        ),
        &["result"], // "admitted", "deferred"
    )
    .unwrap()
});

/// Times the orchestrator entered the paused-for-retries mode.
pub static PAUSES_TRIGGERED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "porter_pauses_triggered_total",
        "Times the orchestrator paused for operator attention",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(ARCHIVES_DISCOVERED.clone()),
        Box::new(ARCHIVE_OUTCOMES.clone()),
        Box::new(ARCHIVE_STAGE_DURATION.clone()),
        Box::new(MEDIA_OUTCOMES.clone()),
        Box::new(MEDIA_UPLOADED.clone()),
        Box::new(ALBUMS_CREATED.clone()),
        Box::new(RETRIES_SCHEDULED.clone()),
        Box::new(ADMISSIONS.clone()),
        Box::new(PAUSES_TRIGGERED.clone()),
    ]
}
