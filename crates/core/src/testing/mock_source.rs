//! Mock archive source for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::fingerprint::bytes_fingerprint;
use crate::source::{ArchiveSource, FetchedArchive, RemoteArchive, SourceError};

/// Mock implementation of the ArchiveSource trait.
///
/// Archives are registered in memory with their byte content; `fetch`
/// writes the bytes to the destination directory like a real transfer
/// would.
#[derive(Debug, Default, Clone)]
pub struct MockArchiveSource {
    archives: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    next_fetch_error: Arc<RwLock<Option<SourceError>>>,
    fetch_count: Arc<RwLock<u64>>,
}

impl MockArchiveSource {
    /// Create a new empty mock source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an archive with the given content.
    pub async fn add_archive(&self, id: impl Into<String>, content: Vec<u8>) {
        self.archives.write().await.insert(id.into(), content);
    }

    /// Remove an archive from the source.
    pub async fn remove_archive(&self, id: &str) {
        self.archives.write().await.remove(id);
    }

    /// Configure the next fetch to fail with the given error.
    pub async fn set_next_fetch_error(&self, error: SourceError) {
        *self.next_fetch_error.write().await = Some(error);
    }

    /// Number of fetches performed.
    pub async fn fetch_count(&self) -> u64 {
        *self.fetch_count.read().await
    }
}

#[async_trait]
impl ArchiveSource for MockArchiveSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn list_available(&self) -> Result<Vec<RemoteArchive>, SourceError> {
        let archives = self.archives.read().await;
        let mut listed: Vec<RemoteArchive> = archives
            .iter()
            .map(|(id, content)| RemoteArchive {
                id: id.clone(),
                name: id.clone(),
                size_bytes: content.len() as u64,
            })
            .collect();
        listed.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(listed)
    }

    async fn fetch(&self, id: &str, dest_dir: &Path) -> Result<FetchedArchive, SourceError> {
        *self.fetch_count.write().await += 1;

        if let Some(error) = self.next_fetch_error.write().await.take() {
            return Err(error);
        }

        let content = {
            let archives = self.archives.read().await;
            archives
                .get(id)
                .cloned()
                .ok_or_else(|| SourceError::NotFound(id.to_string()))?
        };

        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(SourceError::Io)?;
        let path = dest_dir.join(id);
        tokio::fs::write(&path, &content)
            .await
            .map_err(SourceError::Io)?;

        Ok(FetchedArchive {
            path,
            fingerprint: bytes_fingerprint(&content),
            size_bytes: content.len() as u64,
        })
    }
}
