//! Mock metadata tagger for testing.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::tagger::{MediaMetadata, MetadataTagger, TagError};

/// A recorded tagging call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedTag {
    pub media_path: PathBuf,
    pub metadata: MediaMetadata,
}

/// Mock implementation of the MetadataTagger trait.
///
/// Applies nothing to the file; records every call and supports error
/// injection.
#[derive(Debug, Default, Clone)]
pub struct MockTagger {
    tags: Arc<RwLock<Vec<RecordedTag>>>,
    next_error: Arc<RwLock<Option<TagError>>>,
}

impl MockTagger {
    /// Create a new mock tagger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded tagging calls.
    pub async fn recorded_tags(&self) -> Vec<RecordedTag> {
        self.tags.read().await.clone()
    }

    /// Number of tagging calls performed.
    pub async fn tag_count(&self) -> usize {
        self.tags.read().await.len()
    }

    /// Configure the next call to fail with the given error.
    pub async fn set_next_error(&self, error: TagError) {
        *self.next_error.write().await = Some(error);
    }
}

#[async_trait]
impl MetadataTagger for MockTagger {
    fn name(&self) -> &str {
        "mock"
    }

    async fn apply(&self, media_path: &Path, metadata: &MediaMetadata) -> Result<(), TagError> {
        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }
        self.tags.write().await.push(RecordedTag {
            media_path: media_path.to_path_buf(),
            metadata: metadata.clone(),
        });
        Ok(())
    }

    async fn validate(&self) -> Result<(), TagError> {
        Ok(())
    }
}
