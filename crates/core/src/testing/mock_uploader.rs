//! Mock media uploader for testing.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::uploader::{MediaUploader, UploadError, UploadReceipt};

/// A recorded upload for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedUpload {
    pub media_path: PathBuf,
    pub albums: Vec<String>,
    pub remote_id: String,
}

/// Mock implementation of the MediaUploader trait.
///
/// Records every upload and supports two kinds of injected failure:
/// a number of transient failures (rate limiting) applied to the next
/// calls, and permanent rejection of specific file names.
#[derive(Debug, Default, Clone)]
pub struct MockUploader {
    uploads: Arc<RwLock<Vec<RecordedUpload>>>,
    transient_failures_remaining: Arc<RwLock<u32>>,
    reject_file_names: Arc<RwLock<HashSet<String>>>,
    call_count: Arc<RwLock<u64>>,
}

impl MockUploader {
    /// Create a new mock uploader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded uploads.
    pub async fn recorded_uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.read().await.clone()
    }

    /// Number of successful uploads.
    pub async fn upload_count(&self) -> usize {
        self.uploads.read().await.len()
    }

    /// Total upload invocations, including failed ones.
    pub async fn call_count(&self) -> u64 {
        *self.call_count.read().await
    }

    /// Fail the next `count` calls with rate limiting.
    pub async fn fail_next_with_rate_limit(&self, count: u32) {
        *self.transient_failures_remaining.write().await = count;
    }

    /// Permanently reject any upload of a file with this name.
    pub async fn reject_file(&self, file_name: impl Into<String>) {
        self.reject_file_names.write().await.insert(file_name.into());
    }

    /// How many times a given file name was attempted.
    pub async fn attempts_for(&self, file_name: &str) -> usize {
        self.uploads
            .read()
            .await
            .iter()
            .filter(|u| {
                u.media_path
                    .file_name()
                    .map(|n| n.to_string_lossy() == file_name)
                    .unwrap_or(false)
            })
            .count()
    }
}

#[async_trait]
impl MediaUploader for MockUploader {
    fn name(&self) -> &str {
        "mock"
    }

    async fn upload(
        &self,
        media_path: &Path,
        albums: &[String],
    ) -> Result<UploadReceipt, UploadError> {
        *self.call_count.write().await += 1;

        {
            let mut remaining = self.transient_failures_remaining.write().await;
            if *remaining > 0 {
                *remaining -= 1;
                return Err(UploadError::RateLimited);
            }
        }

        let file_name = media_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if self.reject_file_names.read().await.contains(&file_name) {
            return Err(UploadError::rejected("simulated rejection"));
        }

        let remote_id = format!("remote-{}", *self.call_count.read().await);
        self.uploads.write().await.push(RecordedUpload {
            media_path: media_path.to_path_buf(),
            albums: albums.to_vec(),
            remote_id: remote_id.clone(),
        });

        Ok(UploadReceipt { remote_id })
    }

    async fn validate(&self) -> Result<(), UploadError> {
        Ok(())
    }
}
