//! Trait definition for the tagger module.

use async_trait::async_trait;
use std::path::Path;

use super::error::TagError;
use super::types::MediaMetadata;

/// A tool that embeds derived metadata into media files.
///
/// Treated as a black box: failures are classified like any other
/// collaborator failure and never abort the run.
#[async_trait]
pub trait MetadataTagger: Send + Sync {
    /// Returns the name of this tagger implementation.
    fn name(&self) -> &str;

    /// Embeds `metadata` into the file at `media_path` in place.
    async fn apply(&self, media_path: &Path, metadata: &MediaMetadata) -> Result<(), TagError>;

    /// Validates that the tagger is properly configured and ready.
    async fn validate(&self) -> Result<(), TagError>;
}
