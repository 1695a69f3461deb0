//! Core pipeline record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::retry::FailureKind;
use crate::tagger::MediaMetadata;

/// Lifecycle phase of an archive unit.
///
/// State machine flow:
/// ```text
/// Discovered -> Downloading -> Downloaded -> Extracting -> Extracted
///            -> Processed -> Cleaned
///
/// Corrupted and Failed are absorbing, reachable from any non-terminal
/// phase. The only backward transitions are explicit retry resets.
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ArchivePhase {
    /// Known to exist at the source, nothing fetched yet.
    Discovered,
    /// A download worker owns the unit.
    Downloading,
    /// Bytes on local disk, integrity verified.
    Downloaded,
    /// An extract worker owns the unit.
    Extracting,
    /// Contents unpacked; contained media items are tracked individually
    /// from here on.
    Extracted,
    /// Every contained media item reached a terminal phase.
    Processed,
    /// Local archive and extracted files removed.
    Cleaned,
    /// Source bytes failed integrity verification. Needs re-acquisition
    /// or an operator skip.
    Corrupted,
    /// Permanently failed.
    Failed,
}

impl ArchivePhase {
    /// Returns true if no further transitions are possible without
    /// operator action.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ArchivePhase::Cleaned | ArchivePhase::Corrupted | ArchivePhase::Failed
        )
    }

    /// Returns the phase as a string (for storage and filtering).
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchivePhase::Discovered => "discovered",
            ArchivePhase::Downloading => "downloading",
            ArchivePhase::Downloaded => "downloaded",
            ArchivePhase::Extracting => "extracting",
            ArchivePhase::Extracted => "extracted",
            ArchivePhase::Processed => "processed",
            ArchivePhase::Cleaned => "cleaned",
            ArchivePhase::Corrupted => "corrupted",
            ArchivePhase::Failed => "failed",
        }
    }

    /// Parses a stored phase string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "discovered" => Some(ArchivePhase::Discovered),
            "downloading" => Some(ArchivePhase::Downloading),
            "downloaded" => Some(ArchivePhase::Downloaded),
            "extracting" => Some(ArchivePhase::Extracting),
            "extracted" => Some(ArchivePhase::Extracted),
            "processed" => Some(ArchivePhase::Processed),
            "cleaned" => Some(ArchivePhase::Cleaned),
            "corrupted" => Some(ArchivePhase::Corrupted),
            "failed" => Some(ArchivePhase::Failed),
            _ => None,
        }
    }

    /// The phase an in-flight unit is reset to on restart or retry.
    ///
    /// `Downloading` and `Extracting` are worker-owned phases; a unit
    /// found there after an unclean shutdown is re-admitted from the
    /// last durably committed phase.
    pub fn reset_target(&self) -> Option<ArchivePhase> {
        match self {
            ArchivePhase::Downloading => Some(ArchivePhase::Discovered),
            ArchivePhase::Extracting => Some(ArchivePhase::Downloaded),
            _ => None,
        }
    }
}

impl std::fmt::Display for ArchivePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle phase of a media item, tracked individually from the point
/// of extraction onward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MediaPhase {
    /// Unpacked from its archive, untouched.
    Extracted,
    /// Sidecar metadata merged and embedded.
    MetadataMerged,
    /// Album membership resolved and recorded.
    AlbumResolved,
    /// An upload worker owns the item.
    Uploading,
    /// Durably committed as uploaded. Terminal.
    Uploaded,
    /// Permanently failed. Terminal.
    Failed,
}

impl MediaPhase {
    /// Returns true for `Uploaded` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MediaPhase::Uploaded | MediaPhase::Failed)
    }

    /// Returns the phase as a string (for storage and filtering).
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaPhase::Extracted => "extracted",
            MediaPhase::MetadataMerged => "metadata_merged",
            MediaPhase::AlbumResolved => "album_resolved",
            MediaPhase::Uploading => "uploading",
            MediaPhase::Uploaded => "uploaded",
            MediaPhase::Failed => "failed",
        }
    }

    /// Parses a stored phase string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "extracted" => Some(MediaPhase::Extracted),
            "metadata_merged" => Some(MediaPhase::MetadataMerged),
            "album_resolved" => Some(MediaPhase::AlbumResolved),
            "uploading" => Some(MediaPhase::Uploading),
            "uploaded" => Some(MediaPhase::Uploaded),
            "failed" => Some(MediaPhase::Failed),
            _ => None,
        }
    }

    /// The phase preceding this one, used for the explicit retry reset.
    pub fn reset_target(&self) -> Option<MediaPhase> {
        match self {
            MediaPhase::MetadataMerged => Some(MediaPhase::Extracted),
            MediaPhase::AlbumResolved => Some(MediaPhase::MetadataMerged),
            MediaPhase::Uploading => Some(MediaPhase::AlbumResolved),
            _ => None,
        }
    }
}

impl std::fmt::Display for MediaPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One source archive, tracked end-to-end.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArchiveRecord {
    /// Source identifier (remote file id or path).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Expected size in bytes, as reported by the source.
    pub size_bytes: u64,
    /// SHA-256 of the fetched bytes. Set after download; used to detect
    /// re-acquired archives whose content changed.
    #[serde(default)]
    pub fingerprint: Option<String>,
    /// Where the fetched archive lives locally.
    #[serde(default)]
    pub local_path: Option<String>,
    /// Where the archive was extracted to.
    #[serde(default)]
    pub extracted_path: Option<String>,
    /// Current lifecycle phase.
    pub phase: ArchivePhase,
    /// Attempts made across all phases.
    #[serde(default)]
    pub attempts: u32,
    /// Message of the most recent failure.
    #[serde(default)]
    pub last_error: Option<String>,
    /// Classification of the most recent failure.
    #[serde(default)]
    pub last_error_kind: Option<FailureKind>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ArchiveRecord {
    /// Creates a freshly discovered archive record.
    pub fn discovered(id: impl Into<String>, name: impl Into<String>, size_bytes: u64) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            size_bytes,
            fingerprint: None,
            local_path: None,
            extracted_path: None,
            phase: ArchivePhase::Discovered,
            attempts: 0,
            last_error: None,
            last_error_kind: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One photo or video extracted from an archive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaRecord {
    /// Unique identifier (UUID).
    pub id: String,
    /// The archive this item was extracted from.
    pub archive_id: String,
    /// Path of the extracted file on local disk.
    pub source_path: String,
    /// SHA-256 of the file content. Idempotency key for re-processing.
    pub fingerprint: String,
    /// Size in bytes of the extracted file.
    pub size_bytes: u64,
    /// Merged timestamp/GPS/description metadata, once derived.
    #[serde(default)]
    pub metadata: Option<MediaMetadata>,
    /// Resolved album display names. Weak references by name; the album
    /// table owns membership.
    #[serde(default)]
    pub albums: Vec<String>,
    /// Remote identifier returned by the uploader.
    #[serde(default)]
    pub remote_id: Option<String>,
    /// Current lifecycle phase.
    pub phase: MediaPhase,
    /// Attempts made across all phases.
    #[serde(default)]
    pub attempts: u32,
    /// Message of the most recent failure.
    #[serde(default)]
    pub last_error: Option<String>,
    /// Classification of the most recent failure.
    #[serde(default)]
    pub last_error_kind: Option<FailureKind>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MediaRecord {
    /// Creates a freshly extracted media item record.
    pub fn extracted(
        archive_id: impl Into<String>,
        source_path: impl Into<String>,
        fingerprint: impl Into<String>,
        size_bytes: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            archive_id: archive_id.into(),
            source_path: source_path.into(),
            fingerprint: fingerprint.into(),
            size_bytes,
            metadata: None,
            albums: Vec::new(),
            remote_id: None,
            phase: MediaPhase::Extracted,
            attempts: 0,
            last_error: None,
            last_error_kind: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A named collection of media items.
///
/// The canonical key is the trimmed, case-folded name; the display name
/// preserves the casing of whichever spelling was observed first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlbumRecord {
    /// Case-folded matching key, stable across runs.
    pub canonical_key: String,
    /// First-observed display casing.
    pub display_name: String,
    /// When the album was first resolved.
    pub first_seen_at: DateTime<Utc>,
}
