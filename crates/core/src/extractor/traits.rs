//! Trait definition for the extractor module.

use async_trait::async_trait;
use std::path::Path;

use super::error::ExtractError;
use super::types::ExtractedEntry;

/// An archive extraction backend.
#[async_trait]
pub trait ArchiveExtractor: Send + Sync {
    /// Returns the name of this extractor implementation.
    fn name(&self) -> &str;

    /// Verifies archive integrity without extracting. A corrupt or
    /// truncated archive fails with [`ExtractError::CorruptArchive`].
    async fn verify(&self, archive: &Path) -> Result<(), ExtractError>;

    /// Extracts the archive into `dest`, returning every file written.
    async fn extract(
        &self,
        archive: &Path,
        dest: &Path,
    ) -> Result<Vec<ExtractedEntry>, ExtractError>;
}
