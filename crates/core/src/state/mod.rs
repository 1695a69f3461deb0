//! Durable pipeline state.
//!
//! Every archive and media item record lives here, keyed by unit id. All
//! concurrent mutation of phase goes through the store's compare-and-swap
//! [`StateStore::transition_archive`] / [`StateStore::transition_media`]
//! primitives; this is the sole mechanism preventing two workers from
//! double-processing a unit.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteStateStore;
pub use store::{StateError, StateStore};
pub use types::{AlbumRecord, ArchivePhase, ArchiveRecord, MediaPhase, MediaRecord};
