//! Mock archive extractor for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::extractor::{ArchiveExtractor, ExtractError, ExtractedEntry};

/// Mock implementation of the ArchiveExtractor trait.
///
/// Contents are registered per archive file name; `extract` writes the
/// registered files under the destination like a real extraction would.
/// Archives can be marked corrupt to exercise the corrupt-input path.
#[derive(Debug, Default, Clone)]
pub struct MockExtractor {
    /// archive file name -> (relative path, bytes)
    contents: Arc<RwLock<HashMap<String, Vec<(PathBuf, Vec<u8>)>>>>,
    corrupt: Arc<RwLock<HashSet<String>>>,
    next_error: Arc<RwLock<Option<ExtractError>>>,
    verify_count: Arc<RwLock<u64>>,
    extract_count: Arc<RwLock<u64>>,
}

impl MockExtractor {
    /// Create a new empty mock extractor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the files an archive extracts to.
    pub async fn set_contents(
        &self,
        archive_name: impl Into<String>,
        files: Vec<(PathBuf, Vec<u8>)>,
    ) {
        self.contents.write().await.insert(archive_name.into(), files);
    }

    /// Mark an archive as corrupt; verify and extract will fail with
    /// `CorruptArchive`.
    pub async fn mark_corrupt(&self, archive_name: impl Into<String>) {
        self.corrupt.write().await.insert(archive_name.into());
    }

    /// Clear a previous corrupt marking.
    pub async fn clear_corrupt(&self, archive_name: &str) {
        self.corrupt.write().await.remove(archive_name);
    }

    /// Configure the next operation to fail with the given error.
    pub async fn set_next_error(&self, error: ExtractError) {
        *self.next_error.write().await = Some(error);
    }

    /// Number of verifications performed.
    pub async fn verify_count(&self) -> u64 {
        *self.verify_count.read().await
    }

    /// Number of extractions performed.
    pub async fn extract_count(&self) -> u64 {
        *self.extract_count.read().await
    }

    fn archive_key(archive: &Path) -> String {
        archive
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    async fn check_corrupt(&self, archive: &Path) -> Result<(), ExtractError> {
        if self.corrupt.read().await.contains(&Self::archive_key(archive)) {
            return Err(ExtractError::corrupt("simulated CRC failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl ArchiveExtractor for MockExtractor {
    fn name(&self) -> &str {
        "mock"
    }

    async fn verify(&self, archive: &Path) -> Result<(), ExtractError> {
        *self.verify_count.write().await += 1;
        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }
        self.check_corrupt(archive).await
    }

    async fn extract(
        &self,
        archive: &Path,
        dest: &Path,
    ) -> Result<Vec<ExtractedEntry>, ExtractError> {
        *self.extract_count.write().await += 1;
        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }
        self.check_corrupt(archive).await?;

        let files = {
            let contents = self.contents.read().await;
            contents
                .get(&Self::archive_key(archive))
                .cloned()
                .unwrap_or_default()
        };

        let mut entries = Vec::new();
        for (relative_path, bytes) in files {
            let absolute = dest.join(&relative_path);
            if let Some(parent) = absolute.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(ExtractError::Io)?;
            }
            tokio::fs::write(&absolute, &bytes)
                .await
                .map_err(ExtractError::Io)?;
            entries.push(ExtractedEntry {
                relative_path,
                size_bytes: bytes.len() as u64,
            });
        }
        entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_extract_writes_registered_files() {
        let extractor = MockExtractor::new();
        extractor
            .set_contents(
                "a.zip",
                vec![
                    (PathBuf::from("Family/IMG_001.jpg"), b"jpeg".to_vec()),
                    (PathBuf::from("Family/IMG_001.jpg.json"), b"{}".to_vec()),
                ],
            )
            .await;

        let dest = tempfile::tempdir().unwrap();
        let entries = extractor
            .extract(Path::new("/work/a.zip"), dest.path())
            .await
            .unwrap();

        assert_eq!(entries.len(), 2);
        assert!(dest.path().join("Family/IMG_001.jpg").exists());
        assert_eq!(extractor.extract_count().await, 1);
    }

    #[tokio::test]
    async fn test_corrupt_marking() {
        let extractor = MockExtractor::new();
        extractor.mark_corrupt("bad.zip").await;

        let result = extractor.verify(Path::new("/work/bad.zip")).await;
        assert!(matches!(result, Err(ExtractError::CorruptArchive { .. })));

        extractor.clear_corrupt("bad.zip").await;
        assert!(extractor.verify(Path::new("/work/bad.zip")).await.is_ok());
    }
}
