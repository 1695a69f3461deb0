//! Library-tree uploader implementation.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::config::UploaderConfig;
use super::error::UploadError;
use super::traits::MediaUploader;
use super::types::UploadReceipt;

/// Uploader that writes into a local library tree laid out by album:
/// `<library_dir>/<album>/<filename>`. The receipt's remote id is the
/// library-relative path of the placed file.
pub struct LibraryUploader {
    config: UploaderConfig,
}

impl LibraryUploader {
    /// Creates a new library uploader with the given configuration.
    pub fn new(config: UploaderConfig) -> Self {
        Self { config }
    }

    /// Destination directory for an item with the given albums. An item
    /// in several albums is placed under the first; the service-side
    /// album model has no counterpart in a directory tree.
    fn dest_dir(&self, albums: &[String]) -> PathBuf {
        let album = albums
            .iter()
            .map(|a| a.trim())
            .find(|a| !a.is_empty())
            .unwrap_or(&self.config.unsorted_dir);
        self.config.library_dir.join(sanitize_component(album))
    }

    /// Moves the file, falling back to copy+remove across filesystems.
    async fn place(&self, source: &Path, destination: &Path) -> Result<u64, UploadError> {
        let size = fs::metadata(source)
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    UploadError::FileNotFound {
                        path: source.to_path_buf(),
                    }
                } else {
                    UploadError::Io(e)
                }
            })?
            .len();

        match fs::rename(source, destination).await {
            Ok(()) => Ok(size),
            Err(e)
                if e.kind() == std::io::ErrorKind::CrossesDevices
                    || e.raw_os_error() == Some(18) =>
            {
                fs::copy(source, destination)
                    .await
                    .map_err(|e| UploadError::transfer_failed(e.to_string()))?;
                fs::remove_file(source).await.map_err(UploadError::Io)?;
                Ok(size)
            }
            Err(e) => Err(UploadError::transfer_failed(e.to_string())),
        }
    }
}

/// Strips path separators and other characters that do not belong in a
/// single directory component.
fn sanitize_component(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            other => other,
        })
        .collect()
}

#[async_trait]
impl MediaUploader for LibraryUploader {
    fn name(&self) -> &str {
        "library"
    }

    async fn upload(
        &self,
        media_path: &Path,
        albums: &[String],
    ) -> Result<UploadReceipt, UploadError> {
        let file_name = media_path
            .file_name()
            .ok_or_else(|| UploadError::rejected(format!("no file name: {}", media_path.display())))?;

        let dest_dir = self.dest_dir(albums);
        fs::create_dir_all(&dest_dir).await.map_err(UploadError::Io)?;

        let destination = dest_dir.join(file_name);
        if !self.config.overwrite && fs::try_exists(&destination).await.unwrap_or(false) {
            return Err(UploadError::rejected(format!(
                "destination already exists: {}",
                destination.display()
            )));
        }

        self.place(media_path, &destination).await?;

        let remote_id = destination
            .strip_prefix(&self.config.library_dir)
            .unwrap_or(&destination)
            .to_string_lossy()
            .to_string();

        Ok(UploadReceipt { remote_id })
    }

    async fn validate(&self) -> Result<(), UploadError> {
        fs::create_dir_all(&self.config.library_dir)
            .await
            .map_err(UploadError::Io)?;
        Ok(())
    }
}
