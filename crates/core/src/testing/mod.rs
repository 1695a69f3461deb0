//! Mock collaborators for testing.
//!
//! Each mock records its calls for assertions and supports error
//! injection, so orchestrator and pipeline behavior can be exercised
//! without a real source, extractor, tagging tool or destination
//! service.

mod mock_extractor;
mod mock_source;
mod mock_tagger;
mod mock_uploader;

pub use mock_extractor::MockExtractor;
pub use mock_source::MockArchiveSource;
pub use mock_tagger::{MockTagger, RecordedTag};
pub use mock_uploader::{MockUploader, RecordedUpload};
