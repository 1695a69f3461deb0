//! Album derivation and deduplication.
//!
//! Membership is derived from the directory an item was extracted into
//! plus any album hints carried by its sidecar metadata. Matching is
//! case-insensitive and stable across runs: the canonical key is the
//! trimmed, case-folded name, while the display casing of the first
//! observation is preserved forever.

mod resolver;

pub use resolver::{canonical_key, AlbumResolver, ResolvedAlbum};
