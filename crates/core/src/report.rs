//! End-of-run reporting.
//!
//! A run that ends with permanent failures still succeeded for every
//! uploaded item; the report lists both sides precisely so an operator
//! can decide between re-acquisition and skip for what remains.

use serde::{Deserialize, Serialize};

use crate::retry::FailureKind;
use crate::state::{ArchivePhase, MediaPhase, StateError, StateStore};

const REPORT_LIST_LIMIT: usize = 10_000;

/// One permanently failed media item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedItem {
    pub id: String,
    pub archive_id: String,
    pub source_path: String,
    pub kind: Option<FailureKind>,
    pub error: Option<String>,
}

/// Summary of a run, assembled from the state store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Media items durably uploaded.
    pub uploaded: u64,
    /// Media items still in a non-terminal phase.
    pub in_flight: u64,
    /// Permanently failed items with their classification.
    pub failed: Vec<FailedItem>,
    /// Archives whose source bytes are corrupt (need re-acquisition or
    /// an explicit skip).
    pub corrupted_archives: Vec<String>,
    /// Archives fully cleaned up.
    pub cleaned_archives: u64,
    /// Distinct albums known.
    pub albums: u64,
}

/// Builds a report from the current store contents.
pub fn build_report(store: &dyn StateStore) -> Result<RunReport, StateError> {
    let uploaded = store.count_media_by_phase(MediaPhase::Uploaded)?;
    let in_flight = store.count_media_by_phase(MediaPhase::Extracted)?
        + store.count_media_by_phase(MediaPhase::MetadataMerged)?
        + store.count_media_by_phase(MediaPhase::AlbumResolved)?
        + store.count_media_by_phase(MediaPhase::Uploading)?;

    let failed = store
        .list_media_by_phase(MediaPhase::Failed, REPORT_LIST_LIMIT)?
        .into_iter()
        .map(|item| FailedItem {
            id: item.id,
            archive_id: item.archive_id,
            source_path: item.source_path,
            kind: item.last_error_kind,
            error: item.last_error,
        })
        .collect();

    let corrupted_archives = store
        .list_archives_by_phase(ArchivePhase::Corrupted, REPORT_LIST_LIMIT)?
        .into_iter()
        .map(|a| a.id)
        .collect();

    Ok(RunReport {
        uploaded,
        in_flight,
        failed,
        corrupted_archives,
        cleaned_archives: store.count_archives_by_phase(ArchivePhase::Cleaned)?,
        albums: store.list_albums()?.len() as u64,
    })
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "uploaded: {}, in flight: {}, failed: {}, albums: {}, archives cleaned: {}",
            self.uploaded,
            self.in_flight,
            self.failed.len(),
            self.albums,
            self.cleaned_archives
        )?;
        for item in &self.failed {
            let kind = item
                .kind
                .map(|k| k.as_str())
                .unwrap_or("unknown");
            writeln!(
                f,
                "  failed [{}] {} ({}): {}",
                kind,
                item.source_path,
                item.archive_id,
                item.error.as_deref().unwrap_or("no error recorded")
            )?;
        }
        for archive in &self.corrupted_archives {
            writeln!(f, "  corrupt archive: {} (re-acquire or skip)", archive)?;
        }
        Ok(())
    }
}
