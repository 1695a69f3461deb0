//! State storage trait and error type.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::retry::{FailureKind, RetryRecord};
use crate::tagger::MediaMetadata;

use super::types::{AlbumRecord, ArchivePhase, ArchiveRecord, MediaPhase, MediaRecord};

/// Error type for state store operations.
///
/// `Database` and `Corrupt` are infrastructure failures and fatal to the
/// run; `Conflict` is an expected outcome of concurrent transitions.
#[derive(Debug, Error)]
pub enum StateError {
    /// Unit not found.
    #[error("unit not found: {0}")]
    NotFound(String),

    /// Compare-and-swap transition lost to another writer.
    #[error("transition conflict for {unit_id}: expected {expected}, found {actual}")]
    Conflict {
        unit_id: String,
        expected: String,
        actual: String,
    },

    /// The persisted database is damaged. Surfaced at startup, never
    /// silently reset.
    #[error("state database is corrupt: {0}")]
    Corrupt(String),

    /// Underlying database error.
    #[error("database error: {0}")]
    Database(String),
}

/// Durable record of every archive unit and media item.
///
/// Phase changes MUST go through the `transition_*` compare-and-swap
/// methods; `upsert_*` is for creation and for field updates by the
/// worker that currently owns the unit. All mutations are committed
/// before the call returns.
pub trait StateStore: Send + Sync {
    // ------------------------------------------------------------------
    // Archive units
    // ------------------------------------------------------------------

    /// Inserts or replaces an archive record.
    fn upsert_archive(&self, record: &ArchiveRecord) -> Result<(), StateError>;

    /// Fetches an archive record by id.
    fn get_archive(&self, id: &str) -> Result<Option<ArchiveRecord>, StateError>;

    /// Lists archives in the given phase, oldest first, up to `limit`.
    fn list_archives_by_phase(
        &self,
        phase: ArchivePhase,
        limit: usize,
    ) -> Result<Vec<ArchiveRecord>, StateError>;

    /// Atomically moves an archive from `from` to `to`.
    ///
    /// Fails with [`StateError::Conflict`] if another writer already
    /// moved the record.
    fn transition_archive(
        &self,
        id: &str,
        from: ArchivePhase,
        to: ArchivePhase,
    ) -> Result<(), StateError>;

    /// Records a failure against an archive: increments the attempt
    /// count and stores the message and classification.
    fn record_archive_failure(
        &self,
        id: &str,
        message: &str,
        kind: FailureKind,
    ) -> Result<(), StateError>;

    /// Counts archives in the given phase.
    fn count_archives_by_phase(&self, phase: ArchivePhase) -> Result<u64, StateError>;

    // ------------------------------------------------------------------
    // Media items
    // ------------------------------------------------------------------

    /// Inserts or replaces a media record.
    fn upsert_media(&self, record: &MediaRecord) -> Result<(), StateError>;

    /// Fetches a media record by id.
    fn get_media(&self, id: &str) -> Result<Option<MediaRecord>, StateError>;

    /// Finds a media record by content fingerprint.
    fn find_media_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<Option<MediaRecord>, StateError>;

    /// Lists media items in the given phase, oldest first, up to `limit`.
    fn list_media_by_phase(
        &self,
        phase: MediaPhase,
        limit: usize,
    ) -> Result<Vec<MediaRecord>, StateError>;

    /// Lists every media item belonging to an archive.
    fn list_media_for_archive(&self, archive_id: &str) -> Result<Vec<MediaRecord>, StateError>;

    /// Atomically moves a media item from `from` to `to`.
    fn transition_media(
        &self,
        id: &str,
        from: MediaPhase,
        to: MediaPhase,
    ) -> Result<(), StateError>;

    /// Records a failure against a media item.
    fn record_media_failure(
        &self,
        id: &str,
        message: &str,
        kind: FailureKind,
    ) -> Result<(), StateError>;

    /// Stores merged metadata for a media item.
    fn set_media_metadata(&self, id: &str, metadata: &MediaMetadata) -> Result<(), StateError>;

    /// Stores resolved album names for a media item.
    fn set_media_albums(&self, id: &str, albums: &[String]) -> Result<(), StateError>;

    /// Stores the uploader's receipt for a media item.
    fn set_media_remote_id(&self, id: &str, remote_id: &str) -> Result<(), StateError>;

    /// Counts media items in the given phase.
    fn count_media_by_phase(&self, phase: MediaPhase) -> Result<u64, StateError>;

    // ------------------------------------------------------------------
    // Albums
    // ------------------------------------------------------------------

    /// Inserts an album under its canonical key, or returns the existing
    /// record. The display casing of the first observation wins; the
    /// returned bool is true when the album was created by this call.
    fn upsert_album(&self, display_name: &str) -> Result<(AlbumRecord, bool), StateError>;

    /// Adds a media item to an album. Idempotent.
    fn add_album_member(&self, canonical_key: &str, media_id: &str) -> Result<(), StateError>;

    /// Fetches an album by canonical key.
    fn get_album(&self, canonical_key: &str) -> Result<Option<AlbumRecord>, StateError>;

    /// Lists all albums.
    fn list_albums(&self) -> Result<Vec<AlbumRecord>, StateError>;

    /// Lists the media item ids belonging to an album.
    fn album_members(&self, canonical_key: &str) -> Result<Vec<String>, StateError>;

    // ------------------------------------------------------------------
    // Retry bookkeeping
    // ------------------------------------------------------------------

    /// Inserts or replaces the retry record for a unit.
    fn put_retry(&self, record: &RetryRecord) -> Result<(), StateError>;

    /// Fetches the retry record for a unit, if any.
    fn get_retry(&self, unit_id: &str) -> Result<Option<RetryRecord>, StateError>;

    /// Removes the retry record for a unit. Called on success.
    fn clear_retry(&self, unit_id: &str) -> Result<(), StateError>;

    /// Lists retry records whose next attempt is due at `now`.
    fn list_due_retries(&self, now: DateTime<Utc>) -> Result<Vec<RetryRecord>, StateError>;
}
