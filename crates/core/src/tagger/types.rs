//! Metadata types shared across the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata derived for a media item and embedded by the tagging tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MediaMetadata {
    /// When the photo/video was taken.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taken_at: Option<DateTime<Utc>>,

    /// GPS latitude in decimal degrees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,

    /// GPS longitude in decimal degrees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,

    /// Free-text description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl MediaMetadata {
    /// Returns true if there is nothing to embed.
    pub fn is_empty(&self) -> bool {
        self.taken_at.is_none()
            && self.latitude.is_none()
            && self.longitude.is_none()
            && self.description.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_metadata() {
        assert!(MediaMetadata::default().is_empty());
        let with_description = MediaMetadata {
            description: Some("sunset".to_string()),
            ..Default::default()
        };
        assert!(!with_description.is_empty());
    }

    #[test]
    fn test_forward_readable() {
        let json = r#"{"taken_at":"2019-06-01T12:00:00Z","unknown_field":42}"#;
        let metadata: MediaMetadata = serde_json::from_str(json).unwrap();
        assert!(metadata.taken_at.is_some());
        assert!(metadata.latitude.is_none());
    }

    #[test]
    fn test_serialization_skips_none() {
        let metadata = MediaMetadata {
            latitude: Some(45.0),
            ..Default::default()
        };
        let json = serde_json::to_string(&metadata).unwrap();
        assert!(json.contains("latitude"));
        assert!(!json.contains("description"));
    }
}
