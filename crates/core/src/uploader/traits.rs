//! Trait definition for the uploader module.

use async_trait::async_trait;
use std::path::Path;

use super::error::UploadError;
use super::types::UploadReceipt;

/// Destination photo service.
#[async_trait]
pub trait MediaUploader: Send + Sync {
    /// Returns the name of this uploader implementation.
    fn name(&self) -> &str;

    /// Uploads one media file, attaching it to the given albums.
    ///
    /// Callers must not re-invoke this for an item already recorded as
    /// uploaded; the state store transition is the dedup guard.
    async fn upload(
        &self,
        media_path: &Path,
        albums: &[String],
    ) -> Result<UploadReceipt, UploadError>;

    /// Validates that the uploader is properly configured and ready.
    async fn validate(&self) -> Result<(), UploadError>;
}
