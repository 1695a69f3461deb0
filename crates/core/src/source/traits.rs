//! Trait definition for the archive source module.

use async_trait::async_trait;
use std::path::Path;

use super::error::SourceError;
use super::types::{FetchedArchive, RemoteArchive};

/// A store of exported archives waiting to be migrated.
#[async_trait]
pub trait ArchiveSource: Send + Sync {
    /// Returns the name of this source implementation.
    fn name(&self) -> &str;

    /// Lists the archives available at the source.
    async fn list_available(&self) -> Result<Vec<RemoteArchive>, SourceError>;

    /// Fetches one archive into `dest_dir`, returning its local path
    /// and content fingerprint.
    async fn fetch(&self, id: &str, dest_dir: &Path) -> Result<FetchedArchive, SourceError>;
}
