//! Album resolver implementation.

use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex_lite::Regex;
use tracing::debug;

use crate::state::{AlbumRecord, StateError, StateStore};

/// Directories that are year dumps rather than user albums,
/// e.g. "Photos from 2019" or a bare "2019".
static YEAR_DIR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(Photos from )?(19|20)\d{2}$").unwrap());

/// Computes the canonical matching key for an album name: trimmed and
/// case-folded. Stable across runs.
pub fn canonical_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// An album a media item was attached to during resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAlbum {
    /// The persisted album record.
    pub record: AlbumRecord,
    /// True if this resolution created the album, false if it matched a
    /// pre-existing one.
    pub newly_created: bool,
}

/// Derives album membership for media items and deduplicates against
/// previously created albums through the state store.
pub struct AlbumResolver {
    store: Arc<dyn StateStore>,
}

impl AlbumResolver {
    /// Creates a resolver backed by the given store.
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Resolves album membership for one media item.
    ///
    /// Candidates come from the immediate containing directory of the
    /// extracted file (year-dump folders are not albums) and from
    /// sidecar album hints. Resolution is idempotent: running it twice
    /// for the same item attaches to the same album records and creates
    /// no duplicate memberships.
    pub fn resolve(
        &self,
        media_id: &str,
        source_path: &Path,
        album_hints: &[String],
    ) -> Result<Vec<ResolvedAlbum>, StateError> {
        let mut candidates: Vec<String> = Vec::new();

        if let Some(dir_name) = source_path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
        {
            if Self::is_album_directory(dir_name) {
                candidates.push(dir_name.to_string());
            }
        }

        for hint in album_hints {
            if !hint.trim().is_empty() {
                candidates.push(hint.clone());
            }
        }

        // Dedupe by canonical key before touching the store, so one
        // resolution never upserts the same album twice.
        let mut seen_keys: Vec<String> = Vec::new();
        let mut resolved = Vec::new();

        for candidate in candidates {
            let key = canonical_key(&candidate);
            if key.is_empty() || seen_keys.contains(&key) {
                continue;
            }
            seen_keys.push(key.clone());

            let (record, newly_created) = self.store.upsert_album(&candidate)?;
            self.store.add_album_member(&record.canonical_key, media_id)?;

            if newly_created {
                debug!(album = %record.display_name, "created album");
            }
            resolved.push(ResolvedAlbum {
                record,
                newly_created,
            });
        }

        Ok(resolved)
    }

    /// Returns true if a directory name names a user album rather than
    /// a year dump.
    fn is_album_directory(name: &str) -> bool {
        let trimmed = name.trim();
        !trimmed.is_empty() && !YEAR_DIR.is_match(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SqliteStateStore;

    fn resolver() -> AlbumResolver {
        AlbumResolver::new(Arc::new(SqliteStateStore::in_memory().unwrap()))
    }

    #[test]
    fn test_canonical_key_folds_case_and_trims() {
        assert_eq!(canonical_key("  Family "), "family");
        assert_eq!(canonical_key("FAMILY"), "family");
        assert_eq!(canonical_key("Città 2019"), "città 2019");
    }

    #[test]
    fn test_year_directories_are_not_albums() {
        assert!(!AlbumResolver::is_album_directory("Photos from 2019"));
        assert!(!AlbumResolver::is_album_directory("2021"));
        assert!(AlbumResolver::is_album_directory("Family"));
        assert!(AlbumResolver::is_album_directory("Summer 2019"));
        assert!(AlbumResolver::is_album_directory("Photos from the lake"));
    }

    #[test]
    fn test_resolve_from_directory() {
        let resolver = resolver();
        let resolved = resolver
            .resolve("m1", Path::new("/work/a1/Family/IMG_001.jpg"), &[])
            .unwrap();

        assert_eq!(resolved.len(), 1);
        assert!(resolved[0].newly_created);
        assert_eq!(resolved[0].record.display_name, "Family");
    }

    #[test]
    fn test_resolve_skips_year_directory() {
        let resolver = resolver();
        let resolved = resolver
            .resolve("m1", Path::new("/work/a1/Photos from 2019/IMG_001.jpg"), &[])
            .unwrap();
        assert!(resolved.is_empty());
    }

    #[test]
    fn test_sidecar_hints_augment_directory() {
        let resolver = resolver();
        let hints = vec!["Trip to Rome".to_string()];
        let resolved = resolver
            .resolve("m1", Path::new("/work/a1/Family/IMG_001.jpg"), &hints)
            .unwrap();

        let names: Vec<_> = resolved
            .iter()
            .map(|r| r.record.display_name.as_str())
            .collect();
        assert_eq!(names, vec!["Family", "Trip to Rome"]);
    }

    #[test]
    fn test_case_insensitive_match_across_archives() {
        let resolver = resolver();

        let first = resolver
            .resolve("m1", Path::new("/work/a1/Family/IMG_001.jpg"), &[])
            .unwrap();
        assert!(first[0].newly_created);

        // A later archive presents the same album with different casing.
        let second = resolver
            .resolve("m2", Path::new("/work/a2/family/IMG_900.jpg"), &[])
            .unwrap();
        assert!(!second[0].newly_created);
        assert_eq!(second[0].record.canonical_key, first[0].record.canonical_key);
        // First-observed casing wins.
        assert_eq!(second[0].record.display_name, "Family");

        let members = resolver
            .store
            .album_members(&first[0].record.canonical_key)
            .unwrap();
        assert_eq!(members.len(), 2);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let resolver = resolver();
        let path = Path::new("/work/a1/Family/IMG_001.jpg");
        let hints = vec!["family".to_string()]; // same canonical key as the directory

        let first = resolver.resolve("m1", path, &hints).unwrap();
        assert_eq!(first.len(), 1, "duplicate candidates collapse to one album");

        let second = resolver.resolve("m1", path, &hints).unwrap();
        assert_eq!(second.len(), 1);
        assert!(!second[0].newly_created);

        let members = resolver
            .store
            .album_members(&first[0].record.canonical_key)
            .unwrap();
        assert_eq!(members, vec!["m1".to_string()]);

        let albums = resolver.store.list_albums().unwrap();
        assert_eq!(albums.len(), 1);
    }
}
