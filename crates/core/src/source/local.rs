//! Directory-backed archive source.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};

use super::error::SourceError;
use super::traits::ArchiveSource;
use super::types::{FetchedArchive, RemoteArchive};

const BUFFER_SIZE: usize = 256 * 1024;

/// Archive source backed by a local directory, e.g. a mounted drive
/// holding the export. Fetch copies the archive into the working
/// directory, fingerprinting the bytes as they stream through.
pub struct LocalDirSource {
    root: PathBuf,
}

impl LocalDirSource {
    /// Creates a source rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn is_archive_name(name: &str) -> bool {
        let lower = name.to_lowercase();
        lower.ends_with(".zip") || lower.ends_with(".tgz") || lower.ends_with(".tar.gz")
    }
}

#[async_trait]
impl ArchiveSource for LocalDirSource {
    fn name(&self) -> &str {
        "local_dir"
    }

    async fn list_available(&self) -> Result<Vec<RemoteArchive>, SourceError> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| SourceError::unavailable(format!("{}: {}", self.root.display(), e)))?;

        let mut archives = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SourceError::unavailable(e.to_string()))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if !Self::is_archive_name(&name) {
                continue;
            }
            let metadata = entry.metadata().await.map_err(SourceError::Io)?;
            if !metadata.is_file() {
                continue;
            }
            archives.push(RemoteArchive {
                id: name.clone(),
                name,
                size_bytes: metadata.len(),
            });
        }

        archives.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(archives)
    }

    async fn fetch(&self, id: &str, dest_dir: &Path) -> Result<FetchedArchive, SourceError> {
        let source_path = self.root.join(id);
        let source_file = File::open(&source_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SourceError::NotFound(id.to_string())
            } else {
                SourceError::Io(e)
            }
        })?;

        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(SourceError::Io)?;
        let dest_path = dest_dir.join(id);
        let dest_file = File::create(&dest_path)
            .await
            .map_err(|e| SourceError::transfer_failed(format!("{}: {}", dest_path.display(), e)))?;

        let mut reader = BufReader::with_capacity(BUFFER_SIZE, source_file);
        let mut writer = BufWriter::with_capacity(BUFFER_SIZE, dest_file);
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; BUFFER_SIZE];
        let mut total_bytes = 0u64;

        loop {
            let bytes_read = reader
                .read(&mut buffer)
                .await
                .map_err(|e| SourceError::transfer_failed(e.to_string()))?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
            writer
                .write_all(&buffer[..bytes_read])
                .await
                .map_err(|e| SourceError::transfer_failed(e.to_string()))?;
            total_bytes += bytes_read as u64;
        }
        writer
            .flush()
            .await
            .map_err(|e| SourceError::transfer_failed(e.to_string()))?;

        Ok(FetchedArchive {
            path: dest_path,
            fingerprint: format!("{:x}", hasher.finalize()),
            size_bytes: total_bytes,
        })
    }
}
