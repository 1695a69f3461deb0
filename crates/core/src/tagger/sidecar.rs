//! Takeout sidecar parsing.
//!
//! Each exported media file may have a JSON sidecar next to it carrying
//! the taken time, geo data and description; album directories carry a
//! `metadata.json` with the album title. Parsing is tolerant: unknown
//! fields are ignored and malformed sidecars degrade to "no metadata"
//! rather than failing the item.

use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};
use serde::Deserialize;
use tracing::warn;

use super::types::MediaMetadata;

/// Parsed media sidecar.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Sidecar {
    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default, rename = "photoTakenTime")]
    pub photo_taken_time: Option<EpochTime>,

    #[serde(default, rename = "geoData")]
    pub geo_data: Option<GeoData>,
}

/// Epoch-seconds timestamp as Takeout encodes it (a string).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EpochTime {
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Geo coordinates. Takeout writes 0.0/0.0 when unknown.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeoData {
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
}

/// Album-level metadata file found inside album directories.
#[derive(Debug, Clone, Default, Deserialize)]
struct AlbumMetadata {
    #[serde(default)]
    title: Option<String>,
}

impl Sidecar {
    /// Derives embeddable metadata from the sidecar fields.
    pub fn to_metadata(&self) -> MediaMetadata {
        let taken_at = self
            .photo_taken_time
            .as_ref()
            .and_then(|t| t.timestamp.as_deref())
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single());

        let (latitude, longitude) = match &self.geo_data {
            Some(geo) if geo.latitude != 0.0 || geo.longitude != 0.0 => {
                (Some(geo.latitude), Some(geo.longitude))
            }
            _ => (None, None),
        };

        MediaMetadata {
            taken_at,
            latitude,
            longitude,
            description: self
                .description
                .as_ref()
                .filter(|d| !d.trim().is_empty())
                .cloned(),
        }
    }
}

/// Sidecar path candidates for a media file, in lookup order.
///
/// Takeout is inconsistent: usually `<name>.<ext>.json`, sometimes the
/// longer supplemental form, occasionally keyed by the stem alone.
fn sidecar_candidates(media_path: &Path) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    let file_name = match media_path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name,
        None => return candidates,
    };
    let parent = media_path.parent().unwrap_or_else(|| Path::new(""));

    candidates.push(parent.join(format!("{}.json", file_name)));
    candidates.push(parent.join(format!("{}.supplemental-metadata.json", file_name)));
    if let Some(stem) = media_path.file_stem().and_then(|s| s.to_str()) {
        candidates.push(parent.join(format!("{}.json", stem)));
    }
    candidates
}

/// Loads and parses the sidecar for a media file, if one exists.
///
/// A missing sidecar is `Ok(None)`; a malformed one is logged and also
/// treated as absent.
pub async fn load_sidecar(media_path: &Path) -> std::io::Result<Option<Sidecar>> {
    for candidate in sidecar_candidates(media_path) {
        match tokio::fs::read_to_string(&candidate).await {
            Ok(json) => match serde_json::from_str::<Sidecar>(&json) {
                Ok(sidecar) => return Ok(Some(sidecar)),
                Err(e) => {
                    warn!(path = %candidate.display(), "ignoring malformed sidecar: {}", e);
                    return Ok(None);
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(None)
}

/// Reads the album title from a directory's `metadata.json`, if present.
pub async fn album_title_for_directory(dir: &Path) -> std::io::Result<Option<String>> {
    let path = dir.join("metadata.json");
    match tokio::fs::read_to_string(&path).await {
        Ok(json) => match serde_json::from_str::<AlbumMetadata>(&json) {
            Ok(metadata) => Ok(metadata.title.filter(|t| !t.trim().is_empty())),
            Err(e) => {
                warn!(path = %path.display(), "ignoring malformed album metadata: {}", e);
                Ok(None)
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}
