//! Media upload.
//!
//! The remote photo service is an external collaborator behind the
//! [`MediaUploader`] trait. The orchestrator guarantees at-most-once
//! invocation per item through the state store's compare-and-swap
//! transition into `Uploading`; implementations do not need their own
//! dedup. The default wiring uses [`LibraryUploader`], which writes
//! into a local library tree laid out by album.

mod config;
mod error;
mod library;
mod traits;
mod types;

pub use config::UploaderConfig;
pub use error::UploadError;
pub use library::LibraryUploader;
pub use traits::MediaUploader;
pub use types::UploadReceipt;
