//! Embedded-metadata tagging.
//!
//! The tagging tool itself is an external collaborator consumed through
//! the [`MetadataTagger`] trait; this module also owns the sidecar
//! parsing that derives the metadata to embed from Takeout-style JSON
//! files next to each media item.

mod config;
mod error;
mod exiftool;
mod sidecar;
mod traits;
mod types;

pub use config::TaggerConfig;
pub use error::TagError;
pub use exiftool::ExiftoolTagger;
pub use sidecar::{album_title_for_directory, load_sidecar, Sidecar};
pub use traits::MetadataTagger;
pub use types::MediaMetadata;
