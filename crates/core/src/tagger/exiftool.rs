//! Exiftool-based tagger implementation.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::debug;

use super::config::TaggerConfig;
use super::error::TagError;
use super::traits::MetadataTagger;
use super::types::MediaMetadata;

/// Tagger that drives the system `exiftool` binary.
pub struct ExiftoolTagger {
    config: TaggerConfig,
}

impl ExiftoolTagger {
    /// Creates a new exiftool tagger with the given configuration.
    pub fn new(config: TaggerConfig) -> Self {
        Self { config }
    }

    /// Creates a tagger with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(TaggerConfig::default())
    }

    /// Builds exiftool arguments for the given metadata.
    fn build_args(&self, media_path: &Path, metadata: &MediaMetadata) -> Vec<String> {
        let mut args = vec!["-overwrite_original".to_string(), "-q".to_string()];

        if let Some(taken_at) = metadata.taken_at {
            let stamp = taken_at.format("%Y:%m:%d %H:%M:%S").to_string();
            args.push(format!("-DateTimeOriginal={}", stamp));
            args.push(format!("-CreateDate={}", stamp));
        }

        if let (Some(lat), Some(lon)) = (metadata.latitude, metadata.longitude) {
            args.push(format!("-GPSLatitude={}", lat.abs()));
            args.push(format!(
                "-GPSLatitudeRef={}",
                if lat >= 0.0 { "N" } else { "S" }
            ));
            args.push(format!("-GPSLongitude={}", lon.abs()));
            args.push(format!(
                "-GPSLongitudeRef={}",
                if lon >= 0.0 { "E" } else { "W" }
            ));
        }

        if let Some(ref description) = metadata.description {
            args.push(format!("-ImageDescription={}", description));
        }

        args.push(media_path.to_string_lossy().to_string());
        args
    }

    async fn run_exiftool(&self, args: &[String]) -> Result<(), TagError> {
        debug!(tool = %self.config.exiftool_path.display(), ?args, "running exiftool");

        let child = Command::new(&self.config.exiftool_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    TagError::ToolNotFound {
                        path: self.config.exiftool_path.clone(),
                    }
                } else {
                    TagError::Io(e)
                }
            })?;

        let output = timeout(
            Duration::from_secs(self.config.timeout_secs),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| TagError::Timeout {
            timeout_secs: self.config.timeout_secs,
        })?
        .map_err(TagError::Io)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(TagError::tool_failed(
                format!("exiftool exited with {}", output.status),
                Some(stderr),
            ));
        }

        Ok(())
    }
}

#[async_trait]
impl MetadataTagger for ExiftoolTagger {
    fn name(&self) -> &str {
        "exiftool"
    }

    async fn apply(&self, media_path: &Path, metadata: &MediaMetadata) -> Result<(), TagError> {
        if !media_path.exists() {
            return Err(TagError::MediaNotFound {
                path: media_path.to_path_buf(),
            });
        }
        if metadata.is_empty() {
            // Nothing to embed; not an error.
            return Ok(());
        }

        let args = self.build_args(media_path, metadata);
        self.run_exiftool(&args).await
    }

    async fn validate(&self) -> Result<(), TagError> {
        self.run_exiftool(&["-ver".to_string()]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn tagger() -> ExiftoolTagger {
        ExiftoolTagger::with_defaults()
    }

    #[test]
    fn test_build_args_timestamp() {
        let metadata = MediaMetadata {
            taken_at: chrono::Utc.with_ymd_and_hms(2019, 6, 1, 12, 30, 0).single(),
            ..Default::default()
        };
        let args = tagger().build_args(Path::new("/x/a.jpg"), &metadata);
        assert!(args.contains(&"-DateTimeOriginal=2019:06:01 12:30:00".to_string()));
        assert!(args.contains(&"-CreateDate=2019:06:01 12:30:00".to_string()));
        assert_eq!(args.last().unwrap(), "/x/a.jpg");
    }

    #[test]
    fn test_build_args_southern_western_hemisphere() {
        let metadata = MediaMetadata {
            latitude: Some(-33.86),
            longitude: Some(-70.66),
            ..Default::default()
        };
        let args = tagger().build_args(Path::new("/x/a.jpg"), &metadata);
        assert!(args.contains(&"-GPSLatitudeRef=S".to_string()));
        assert!(args.contains(&"-GPSLongitudeRef=W".to_string()));
        assert!(args.contains(&"-GPSLatitude=33.86".to_string()));
    }

    #[test]
    fn test_build_args_description() {
        let metadata = MediaMetadata {
            description: Some("boat trip".to_string()),
            ..Default::default()
        };
        let args = tagger().build_args(Path::new("/x/a.jpg"), &metadata);
        assert!(args.contains(&"-ImageDescription=boat trip".to_string()));
    }

    #[tokio::test]
    async fn test_apply_missing_media_errors() {
        let metadata = MediaMetadata {
            description: Some("x".to_string()),
            ..Default::default()
        };
        let result = tagger()
            .apply(Path::new("/nonexistent/a.jpg"), &metadata)
            .await;
        assert!(matches!(result, Err(TagError::MediaNotFound { .. })));
    }

    #[tokio::test]
    async fn test_apply_empty_metadata_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path().join("a.jpg");
        tokio::fs::write(&media, b"jpeg").await.unwrap();

        // No tool invocation happens, so this succeeds without exiftool.
        tagger()
            .apply(&media, &MediaMetadata::default())
            .await
            .unwrap();
    }
}
