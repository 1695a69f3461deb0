//! Archive extraction.
//!
//! Extraction is an external collaborator behind the
//! [`ArchiveExtractor`] trait. Corrupt or truncated archives must be
//! detectable through `verify` and reported as corrupt input, never
//! silently yielding partial contents. The default implementation
//! drives the system `unzip` binary.

mod command;
mod config;
mod error;
mod traits;
mod types;

pub use command::CommandExtractor;
pub use config::ExtractorConfig;
pub use error::ExtractError;
pub use traits::ArchiveExtractor;
pub use types::ExtractedEntry;
