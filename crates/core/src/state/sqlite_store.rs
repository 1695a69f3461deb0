//! SQLite-backed state store implementation.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::album::canonical_key;
use crate::retry::{FailureKind, RetryRecord};
use crate::tagger::MediaMetadata;

use super::store::{StateError, StateStore};
use super::types::{AlbumRecord, ArchivePhase, ArchiveRecord, MediaPhase, MediaRecord};

/// SQLite-backed state store.
pub struct SqliteStateStore {
    conn: Mutex<Connection>,
}

impl SqliteStateStore {
    /// Opens (or creates) the state database at `path`.
    ///
    /// Runs an integrity check first: a damaged database is a fatal
    /// [`StateError::Corrupt`], never silently recreated.
    pub fn new(path: &Path) -> Result<Self, StateError> {
        let conn = Connection::open(path).map_err(|e| StateError::Database(e.to_string()))?;
        Self::check_integrity(&conn)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory state store (useful for testing).
    pub fn in_memory() -> Result<Self, StateError> {
        let conn =
            Connection::open_in_memory().map_err(|e| StateError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn check_integrity(conn: &Connection) -> Result<(), StateError> {
        let verdict: String = conn
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))
            .map_err(|e| StateError::Corrupt(e.to_string()))?;
        if verdict != "ok" {
            return Err(StateError::Corrupt(verdict));
        }
        Ok(())
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StateError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS archives (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                fingerprint TEXT,
                local_path TEXT,
                extracted_path TEXT,
                phase TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                last_error_kind TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_archives_phase ON archives(phase);

            CREATE TABLE IF NOT EXISTS media_items (
                id TEXT PRIMARY KEY,
                archive_id TEXT NOT NULL,
                source_path TEXT NOT NULL,
                fingerprint TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                metadata TEXT,
                albums TEXT NOT NULL DEFAULT '[]',
                remote_id TEXT,
                phase TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                last_error_kind TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_media_phase ON media_items(phase);
            CREATE INDEX IF NOT EXISTS idx_media_archive ON media_items(archive_id);
            CREATE INDEX IF NOT EXISTS idx_media_fingerprint ON media_items(fingerprint);

            CREATE TABLE IF NOT EXISTS albums (
                canonical_key TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                first_seen_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS album_members (
                canonical_key TEXT NOT NULL,
                media_id TEXT NOT NULL,
                PRIMARY KEY (canonical_key, media_id)
            );

            CREATE TABLE IF NOT EXISTS retries (
                unit_id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                attempts INTEGER NOT NULL,
                next_retry_at TEXT NOT NULL,
                resume_phase TEXT NOT NULL,
                scheduled_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_retries_due ON retries(next_retry_at);
            "#,
        )
        .map_err(|e| StateError::Database(e.to_string()))?;

        // Migration: add remote_id column if it doesn't exist
        let _ = conn.execute("ALTER TABLE media_items ADD COLUMN remote_id TEXT", []);

        Ok(())
    }

    fn bad_column(msg: String) -> rusqlite::Error {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            msg.into(),
        )
    }

    fn parse_time(s: &str) -> rusqlite::Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| Self::bad_column(format!("bad timestamp {:?}: {}", s, e)))
    }

    fn row_to_archive(row: &rusqlite::Row) -> rusqlite::Result<ArchiveRecord> {
        let phase_str: String = row.get(6)?;
        let phase = ArchivePhase::parse(&phase_str)
            .ok_or_else(|| Self::bad_column(format!("unknown archive phase {:?}", phase_str)))?;

        let kind_str: Option<String> = row.get(9)?;
        let last_error_kind = match kind_str {
            Some(s) => Some(
                FailureKind::parse(&s)
                    .ok_or_else(|| Self::bad_column(format!("unknown failure kind {:?}", s)))?,
            ),
            None => None,
        };

        let created_at_str: String = row.get(10)?;
        let updated_at_str: String = row.get(11)?;

        Ok(ArchiveRecord {
            id: row.get(0)?,
            name: row.get(1)?,
            size_bytes: row.get::<_, i64>(2)? as u64,
            fingerprint: row.get(3)?,
            local_path: row.get(4)?,
            extracted_path: row.get(5)?,
            phase,
            attempts: row.get(7)?,
            last_error: row.get(8)?,
            last_error_kind,
            created_at: Self::parse_time(&created_at_str)?,
            updated_at: Self::parse_time(&updated_at_str)?,
        })
    }

    fn row_to_media(row: &rusqlite::Row) -> rusqlite::Result<MediaRecord> {
        let phase_str: String = row.get(8)?;
        let phase = MediaPhase::parse(&phase_str)
            .ok_or_else(|| Self::bad_column(format!("unknown media phase {:?}", phase_str)))?;

        let metadata_json: Option<String> = row.get(5)?;
        let metadata: Option<MediaMetadata> = match metadata_json {
            Some(json) => Some(
                serde_json::from_str(&json)
                    .map_err(|e| Self::bad_column(format!("bad metadata json: {}", e)))?,
            ),
            None => None,
        };

        let albums_json: String = row.get(6)?;
        let albums: Vec<String> = serde_json::from_str(&albums_json)
            .map_err(|e| Self::bad_column(format!("bad albums json: {}", e)))?;

        let kind_str: Option<String> = row.get(11)?;
        let last_error_kind = match kind_str {
            Some(s) => Some(
                FailureKind::parse(&s)
                    .ok_or_else(|| Self::bad_column(format!("unknown failure kind {:?}", s)))?,
            ),
            None => None,
        };

        let created_at_str: String = row.get(12)?;
        let updated_at_str: String = row.get(13)?;

        Ok(MediaRecord {
            id: row.get(0)?,
            archive_id: row.get(1)?,
            source_path: row.get(2)?,
            fingerprint: row.get(3)?,
            size_bytes: row.get::<_, i64>(4)? as u64,
            metadata,
            albums,
            remote_id: row.get(7)?,
            phase,
            attempts: row.get(9)?,
            last_error: row.get(10)?,
            last_error_kind,
            created_at: Self::parse_time(&created_at_str)?,
            updated_at: Self::parse_time(&updated_at_str)?,
        })
    }

    fn row_to_retry(row: &rusqlite::Row) -> rusqlite::Result<RetryRecord> {
        let kind_str: String = row.get(1)?;
        let kind = FailureKind::parse(&kind_str)
            .ok_or_else(|| Self::bad_column(format!("unknown failure kind {:?}", kind_str)))?;

        let next_str: String = row.get(3)?;
        let scheduled_str: String = row.get(5)?;

        Ok(RetryRecord {
            unit_id: row.get(0)?,
            kind,
            attempts: row.get(2)?,
            next_retry_at: Self::parse_time(&next_str)?,
            resume_phase: row.get(4)?,
            scheduled_at: Self::parse_time(&scheduled_str)?,
        })
    }

    const ARCHIVE_COLUMNS: &'static str = "id, name, size_bytes, fingerprint, local_path, \
         extracted_path, phase, attempts, last_error, last_error_kind, created_at, updated_at";

    const MEDIA_COLUMNS: &'static str = "id, archive_id, source_path, fingerprint, size_bytes, \
         metadata, albums, remote_id, phase, attempts, last_error, last_error_kind, \
         created_at, updated_at";
}

impl StateStore for SqliteStateStore {
    fn upsert_archive(&self, record: &ArchiveRecord) -> Result<(), StateError> {
        let conn = self.conn.lock().unwrap();
        let kind = record.last_error_kind.map(|k| k.as_str().to_string());
        conn.execute(
            "INSERT OR REPLACE INTO archives \
             (id, name, size_bytes, fingerprint, local_path, extracted_path, phase, attempts, \
              last_error, last_error_kind, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                record.id,
                record.name,
                record.size_bytes as i64,
                record.fingerprint,
                record.local_path,
                record.extracted_path,
                record.phase.as_str(),
                record.attempts,
                record.last_error,
                kind,
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| StateError::Database(e.to_string()))?;
        Ok(())
    }

    fn get_archive(&self, id: &str) -> Result<Option<ArchiveRecord>, StateError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {} FROM archives WHERE id = ?",
            Self::ARCHIVE_COLUMNS
        );
        match conn.query_row(&sql, params![id], Self::row_to_archive) {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StateError::Database(e.to_string())),
        }
    }

    fn list_archives_by_phase(
        &self,
        phase: ArchivePhase,
        limit: usize,
    ) -> Result<Vec<ArchiveRecord>, StateError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {} FROM archives WHERE phase = ? ORDER BY created_at ASC, id ASC LIMIT ?",
            Self::ARCHIVE_COLUMNS
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| StateError::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![phase.as_str(), limit as i64], Self::row_to_archive)
            .map_err(|e| StateError::Database(e.to_string()))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(|e| StateError::Database(e.to_string()))?);
        }
        Ok(records)
    }

    fn transition_archive(
        &self,
        id: &str,
        from: ArchivePhase,
        to: ArchivePhase,
    ) -> Result<(), StateError> {
        let conn = self.conn.lock().unwrap();
        let rows = conn
            .execute(
                "UPDATE archives SET phase = ?, updated_at = ? WHERE id = ? AND phase = ?",
                params![to.as_str(), Utc::now().to_rfc3339(), id, from.as_str()],
            )
            .map_err(|e| StateError::Database(e.to_string()))?;

        if rows == 1 {
            return Ok(());
        }

        // CAS lost: distinguish a missing record from a concurrent move.
        let actual: Option<String> = conn
            .query_row(
                "SELECT phase FROM archives WHERE id = ?",
                params![id],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(StateError::Database(other.to_string())),
            })?;

        match actual {
            Some(actual) => Err(StateError::Conflict {
                unit_id: id.to_string(),
                expected: from.as_str().to_string(),
                actual,
            }),
            None => Err(StateError::NotFound(id.to_string())),
        }
    }

    fn record_archive_failure(
        &self,
        id: &str,
        message: &str,
        kind: FailureKind,
    ) -> Result<(), StateError> {
        let conn = self.conn.lock().unwrap();
        let rows = conn
            .execute(
                "UPDATE archives SET attempts = attempts + 1, last_error = ?, \
                 last_error_kind = ?, updated_at = ? WHERE id = ?",
                params![message, kind.as_str(), Utc::now().to_rfc3339(), id],
            )
            .map_err(|e| StateError::Database(e.to_string()))?;
        if rows == 0 {
            return Err(StateError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn count_archives_by_phase(&self, phase: ArchivePhase) -> Result<u64, StateError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM archives WHERE phase = ?",
                params![phase.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| StateError::Database(e.to_string()))?;
        Ok(count as u64)
    }

    fn upsert_media(&self, record: &MediaRecord) -> Result<(), StateError> {
        let conn = self.conn.lock().unwrap();
        let metadata = record
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StateError::Database(e.to_string()))?;
        let albums = serde_json::to_string(&record.albums)
            .map_err(|e| StateError::Database(e.to_string()))?;
        let kind = record.last_error_kind.map(|k| k.as_str().to_string());

        conn.execute(
            "INSERT OR REPLACE INTO media_items \
             (id, archive_id, source_path, fingerprint, size_bytes, metadata, albums, remote_id, \
              phase, attempts, last_error, last_error_kind, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                record.id,
                record.archive_id,
                record.source_path,
                record.fingerprint,
                record.size_bytes as i64,
                metadata,
                albums,
                record.remote_id,
                record.phase.as_str(),
                record.attempts,
                record.last_error,
                kind,
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| StateError::Database(e.to_string()))?;
        Ok(())
    }

    fn get_media(&self, id: &str) -> Result<Option<MediaRecord>, StateError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT {} FROM media_items WHERE id = ?", Self::MEDIA_COLUMNS);
        match conn.query_row(&sql, params![id], Self::row_to_media) {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StateError::Database(e.to_string())),
        }
    }

    fn find_media_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<Option<MediaRecord>, StateError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {} FROM media_items WHERE fingerprint = ? LIMIT 1",
            Self::MEDIA_COLUMNS
        );
        match conn.query_row(&sql, params![fingerprint], Self::row_to_media) {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StateError::Database(e.to_string())),
        }
    }

    fn list_media_by_phase(
        &self,
        phase: MediaPhase,
        limit: usize,
    ) -> Result<Vec<MediaRecord>, StateError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {} FROM media_items WHERE phase = ? ORDER BY created_at ASC, id ASC LIMIT ?",
            Self::MEDIA_COLUMNS
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| StateError::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![phase.as_str(), limit as i64], Self::row_to_media)
            .map_err(|e| StateError::Database(e.to_string()))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(|e| StateError::Database(e.to_string()))?);
        }
        Ok(records)
    }

    fn list_media_for_archive(&self, archive_id: &str) -> Result<Vec<MediaRecord>, StateError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {} FROM media_items WHERE archive_id = ? ORDER BY source_path ASC",
            Self::MEDIA_COLUMNS
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| StateError::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![archive_id], Self::row_to_media)
            .map_err(|e| StateError::Database(e.to_string()))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(|e| StateError::Database(e.to_string()))?);
        }
        Ok(records)
    }

    fn transition_media(
        &self,
        id: &str,
        from: MediaPhase,
        to: MediaPhase,
    ) -> Result<(), StateError> {
        let conn = self.conn.lock().unwrap();
        let rows = conn
            .execute(
                "UPDATE media_items SET phase = ?, updated_at = ? WHERE id = ? AND phase = ?",
                params![to.as_str(), Utc::now().to_rfc3339(), id, from.as_str()],
            )
            .map_err(|e| StateError::Database(e.to_string()))?;

        if rows == 1 {
            return Ok(());
        }

        let actual: Option<String> = conn
            .query_row(
                "SELECT phase FROM media_items WHERE id = ?",
                params![id],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(StateError::Database(other.to_string())),
            })?;

        match actual {
            Some(actual) => Err(StateError::Conflict {
                unit_id: id.to_string(),
                expected: from.as_str().to_string(),
                actual,
            }),
            None => Err(StateError::NotFound(id.to_string())),
        }
    }

    fn record_media_failure(
        &self,
        id: &str,
        message: &str,
        kind: FailureKind,
    ) -> Result<(), StateError> {
        let conn = self.conn.lock().unwrap();
        let rows = conn
            .execute(
                "UPDATE media_items SET attempts = attempts + 1, last_error = ?, \
                 last_error_kind = ?, updated_at = ? WHERE id = ?",
                params![message, kind.as_str(), Utc::now().to_rfc3339(), id],
            )
            .map_err(|e| StateError::Database(e.to_string()))?;
        if rows == 0 {
            return Err(StateError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn set_media_metadata(&self, id: &str, metadata: &MediaMetadata) -> Result<(), StateError> {
        let conn = self.conn.lock().unwrap();
        let json =
            serde_json::to_string(metadata).map_err(|e| StateError::Database(e.to_string()))?;
        let rows = conn
            .execute(
                "UPDATE media_items SET metadata = ?, updated_at = ? WHERE id = ?",
                params![json, Utc::now().to_rfc3339(), id],
            )
            .map_err(|e| StateError::Database(e.to_string()))?;
        if rows == 0 {
            return Err(StateError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn set_media_albums(&self, id: &str, albums: &[String]) -> Result<(), StateError> {
        let conn = self.conn.lock().unwrap();
        let json =
            serde_json::to_string(albums).map_err(|e| StateError::Database(e.to_string()))?;
        let rows = conn
            .execute(
                "UPDATE media_items SET albums = ?, updated_at = ? WHERE id = ?",
                params![json, Utc::now().to_rfc3339(), id],
            )
            .map_err(|e| StateError::Database(e.to_string()))?;
        if rows == 0 {
            return Err(StateError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn set_media_remote_id(&self, id: &str, remote_id: &str) -> Result<(), StateError> {
        let conn = self.conn.lock().unwrap();
        let rows = conn
            .execute(
                "UPDATE media_items SET remote_id = ?, updated_at = ? WHERE id = ?",
                params![remote_id, Utc::now().to_rfc3339(), id],
            )
            .map_err(|e| StateError::Database(e.to_string()))?;
        if rows == 0 {
            return Err(StateError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn count_media_by_phase(&self, phase: MediaPhase) -> Result<u64, StateError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM media_items WHERE phase = ?",
                params![phase.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| StateError::Database(e.to_string()))?;
        Ok(count as u64)
    }

    fn upsert_album(&self, display_name: &str) -> Result<(AlbumRecord, bool), StateError> {
        let conn = self.conn.lock().unwrap();
        let key = canonical_key(display_name);
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO albums (canonical_key, display_name, first_seen_at) \
                 VALUES (?, ?, ?)",
                params![key, display_name.trim(), Utc::now().to_rfc3339()],
            )
            .map_err(|e| StateError::Database(e.to_string()))?;

        let record = conn
            .query_row(
                "SELECT canonical_key, display_name, first_seen_at FROM albums \
                 WHERE canonical_key = ?",
                params![key],
                |row| {
                    let first_seen: String = row.get(2)?;
                    Ok(AlbumRecord {
                        canonical_key: row.get(0)?,
                        display_name: row.get(1)?,
                        first_seen_at: Self::parse_time(&first_seen)?,
                    })
                },
            )
            .map_err(|e| StateError::Database(e.to_string()))?;

        Ok((record, inserted == 1))
    }

    fn add_album_member(&self, canonical_key: &str, media_id: &str) -> Result<(), StateError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO album_members (canonical_key, media_id) VALUES (?, ?)",
            params![canonical_key, media_id],
        )
        .map_err(|e| StateError::Database(e.to_string()))?;
        Ok(())
    }

    fn get_album(&self, canonical_key: &str) -> Result<Option<AlbumRecord>, StateError> {
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(
            "SELECT canonical_key, display_name, first_seen_at FROM albums \
             WHERE canonical_key = ?",
            params![canonical_key],
            |row| {
                let first_seen: String = row.get(2)?;
                Ok(AlbumRecord {
                    canonical_key: row.get(0)?,
                    display_name: row.get(1)?,
                    first_seen_at: Self::parse_time(&first_seen)?,
                })
            },
        );
        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StateError::Database(e.to_string())),
        }
    }

    fn list_albums(&self) -> Result<Vec<AlbumRecord>, StateError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT canonical_key, display_name, first_seen_at FROM albums \
                 ORDER BY canonical_key ASC",
            )
            .map_err(|e| StateError::Database(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                let first_seen: String = row.get(2)?;
                Ok(AlbumRecord {
                    canonical_key: row.get(0)?,
                    display_name: row.get(1)?,
                    first_seen_at: Self::parse_time(&first_seen)?,
                })
            })
            .map_err(|e| StateError::Database(e.to_string()))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(|e| StateError::Database(e.to_string()))?);
        }
        Ok(records)
    }

    fn album_members(&self, canonical_key: &str) -> Result<Vec<String>, StateError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT media_id FROM album_members WHERE canonical_key = ? ORDER BY media_id ASC",
            )
            .map_err(|e| StateError::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![canonical_key], |row| row.get::<_, String>(0))
            .map_err(|e| StateError::Database(e.to_string()))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row.map_err(|e| StateError::Database(e.to_string()))?);
        }
        Ok(ids)
    }

    fn put_retry(&self, record: &RetryRecord) -> Result<(), StateError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO retries \
             (unit_id, kind, attempts, next_retry_at, resume_phase, scheduled_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                record.unit_id,
                record.kind.as_str(),
                record.attempts,
                record.next_retry_at.to_rfc3339(),
                record.resume_phase,
                record.scheduled_at.to_rfc3339(),
            ],
        )
        .map_err(|e| StateError::Database(e.to_string()))?;
        Ok(())
    }

    fn get_retry(&self, unit_id: &str) -> Result<Option<RetryRecord>, StateError> {
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(
            "SELECT unit_id, kind, attempts, next_retry_at, resume_phase, scheduled_at \
             FROM retries WHERE unit_id = ?",
            params![unit_id],
            Self::row_to_retry,
        );
        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StateError::Database(e.to_string())),
        }
    }

    fn clear_retry(&self, unit_id: &str) -> Result<(), StateError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM retries WHERE unit_id = ?", params![unit_id])
            .map_err(|e| StateError::Database(e.to_string()))?;
        Ok(())
    }

    fn list_due_retries(&self, now: DateTime<Utc>) -> Result<Vec<RetryRecord>, StateError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT unit_id, kind, attempts, next_retry_at, resume_phase, scheduled_at \
                 FROM retries WHERE next_retry_at <= ? ORDER BY next_retry_at ASC",
            )
            .map_err(|e| StateError::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![now.to_rfc3339()], Self::row_to_retry)
            .map_err(|e| StateError::Database(e.to_string()))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(|e| StateError::Database(e.to_string()))?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_store() -> SqliteStateStore {
        SqliteStateStore::in_memory().unwrap()
    }

    fn archive(id: &str) -> ArchiveRecord {
        ArchiveRecord::discovered(id, format!("{}.zip", id), 10 * 1024 * 1024)
    }

    fn media(archive_id: &str, path: &str, fingerprint: &str) -> MediaRecord {
        MediaRecord::extracted(archive_id, path, fingerprint, 1024)
    }

    #[test]
    fn test_archive_roundtrip() {
        let store = create_test_store();
        let record = archive("takeout-001");
        store.upsert_archive(&record).unwrap();

        let fetched = store.get_archive("takeout-001").unwrap().unwrap();
        assert_eq!(fetched.id, "takeout-001");
        assert_eq!(fetched.phase, ArchivePhase::Discovered);
        assert_eq!(fetched.size_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn test_get_missing_archive() {
        let store = create_test_store();
        assert!(store.get_archive("nope").unwrap().is_none());
    }

    #[test]
    fn test_list_archives_by_phase() {
        let store = create_test_store();
        for i in 0..3 {
            store.upsert_archive(&archive(&format!("a{}", i))).unwrap();
        }
        store
            .transition_archive("a1", ArchivePhase::Discovered, ArchivePhase::Downloading)
            .unwrap();

        let discovered = store
            .list_archives_by_phase(ArchivePhase::Discovered, 10)
            .unwrap();
        assert_eq!(discovered.len(), 2);

        let downloading = store
            .list_archives_by_phase(ArchivePhase::Downloading, 10)
            .unwrap();
        assert_eq!(downloading.len(), 1);
        assert_eq!(downloading[0].id, "a1");
    }

    #[test]
    fn test_list_archives_respects_limit() {
        let store = create_test_store();
        for i in 0..5 {
            store.upsert_archive(&archive(&format!("a{}", i))).unwrap();
        }
        let page = store
            .list_archives_by_phase(ArchivePhase::Discovered, 2)
            .unwrap();
        assert_eq!(page.len(), 2);
    }

    #[test]
    fn test_transition_archive_cas() {
        let store = create_test_store();
        store.upsert_archive(&archive("a1")).unwrap();

        store
            .transition_archive("a1", ArchivePhase::Discovered, ArchivePhase::Downloading)
            .unwrap();

        // Second writer expecting the old phase loses.
        let err = store
            .transition_archive("a1", ArchivePhase::Discovered, ArchivePhase::Downloading)
            .unwrap_err();
        assert!(matches!(err, StateError::Conflict { .. }));

        let fetched = store.get_archive("a1").unwrap().unwrap();
        assert_eq!(fetched.phase, ArchivePhase::Downloading);
    }

    #[test]
    fn test_transition_missing_archive() {
        let store = create_test_store();
        let err = store
            .transition_archive("ghost", ArchivePhase::Discovered, ArchivePhase::Downloading)
            .unwrap_err();
        assert!(matches!(err, StateError::NotFound(_)));
    }

    #[test]
    fn test_record_archive_failure() {
        let store = create_test_store();
        store.upsert_archive(&archive("a1")).unwrap();

        store
            .record_archive_failure("a1", "connection reset", FailureKind::Transient)
            .unwrap();
        store
            .record_archive_failure("a1", "connection reset again", FailureKind::Transient)
            .unwrap();

        let fetched = store.get_archive("a1").unwrap().unwrap();
        assert_eq!(fetched.attempts, 2);
        assert_eq!(fetched.last_error.as_deref(), Some("connection reset again"));
        assert_eq!(fetched.last_error_kind, Some(FailureKind::Transient));
    }

    #[test]
    fn test_media_roundtrip_with_metadata() {
        let store = create_test_store();
        store.upsert_archive(&archive("a1")).unwrap();
        let record = media("a1", "/work/a1/IMG_001.jpg", "fp-1");
        store.upsert_media(&record).unwrap();

        let metadata = MediaMetadata {
            taken_at: Some(Utc::now()),
            latitude: Some(45.46),
            longitude: Some(9.19),
            description: Some("piazza".to_string()),
        };
        store.set_media_metadata(&record.id, &metadata).unwrap();
        store
            .set_media_albums(&record.id, &["Milano 2019".to_string()])
            .unwrap();

        let fetched = store.get_media(&record.id).unwrap().unwrap();
        assert_eq!(fetched.metadata.as_ref().unwrap().latitude, Some(45.46));
        assert_eq!(fetched.albums, vec!["Milano 2019".to_string()]);
    }

    #[test]
    fn test_find_media_by_fingerprint() {
        let store = create_test_store();
        let record = media("a1", "/work/a1/IMG_001.jpg", "fp-unique");
        store.upsert_media(&record).unwrap();

        let found = store.find_media_by_fingerprint("fp-unique").unwrap();
        assert_eq!(found.unwrap().id, record.id);
        assert!(store.find_media_by_fingerprint("fp-other").unwrap().is_none());
    }

    #[test]
    fn test_transition_media_cas() {
        let store = create_test_store();
        let record = media("a1", "/work/a1/IMG_001.jpg", "fp-1");
        store.upsert_media(&record).unwrap();

        store
            .transition_media(&record.id, MediaPhase::Extracted, MediaPhase::MetadataMerged)
            .unwrap();
        let err = store
            .transition_media(&record.id, MediaPhase::Extracted, MediaPhase::MetadataMerged)
            .unwrap_err();
        assert!(matches!(err, StateError::Conflict { .. }));
    }

    #[test]
    fn test_list_media_for_archive() {
        let store = create_test_store();
        for i in 0..3 {
            store
                .upsert_media(&media("a1", &format!("/w/a1/{}.jpg", i), &format!("fp{}", i)))
                .unwrap();
        }
        store
            .upsert_media(&media("a2", "/w/a2/0.jpg", "fp-other"))
            .unwrap();

        let items = store.list_media_for_archive("a1").unwrap();
        assert_eq!(items.len(), 3);
    }

    #[test]
    fn test_upsert_album_first_casing_wins() {
        let store = create_test_store();
        let (first, created) = store.upsert_album("Family").unwrap();
        assert!(created);
        assert_eq!(first.display_name, "Family");

        let (second, created) = store.upsert_album("family").unwrap();
        assert!(!created);
        assert_eq!(second.canonical_key, first.canonical_key);
        assert_eq!(second.display_name, "Family");
    }

    #[test]
    fn test_album_membership_idempotent() {
        let store = create_test_store();
        let (album, _) = store.upsert_album("Trip to Rome").unwrap();

        store.add_album_member(&album.canonical_key, "m1").unwrap();
        store.add_album_member(&album.canonical_key, "m1").unwrap();
        store.add_album_member(&album.canonical_key, "m2").unwrap();

        let members = store.album_members(&album.canonical_key).unwrap();
        assert_eq!(members, vec!["m1".to_string(), "m2".to_string()]);
    }

    #[test]
    fn test_retry_roundtrip_and_due_listing() {
        let store = create_test_store();
        let now = Utc::now();

        let due = RetryRecord {
            unit_id: "m1".to_string(),
            kind: FailureKind::Transient,
            attempts: 1,
            next_retry_at: now - chrono::Duration::seconds(5),
            resume_phase: "album_resolved".to_string(),
            scheduled_at: now - chrono::Duration::seconds(60),
        };
        let not_due = RetryRecord {
            unit_id: "m2".to_string(),
            next_retry_at: now + chrono::Duration::seconds(300),
            ..due.clone()
        };
        store.put_retry(&due).unwrap();
        store.put_retry(&not_due).unwrap();

        let listed = store.list_due_retries(now).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].unit_id, "m1");

        store.clear_retry("m1").unwrap();
        assert!(store.get_retry("m1").unwrap().is_none());
        assert!(store.get_retry("m2").unwrap().is_some());
    }

    #[test]
    fn test_counts() {
        let store = create_test_store();
        store.upsert_archive(&archive("a1")).unwrap();
        store.upsert_archive(&archive("a2")).unwrap();
        store
            .upsert_media(&media("a1", "/w/a1/0.jpg", "fp0"))
            .unwrap();

        assert_eq!(
            store.count_archives_by_phase(ArchivePhase::Discovered).unwrap(),
            2
        );
        assert_eq!(store.count_media_by_phase(MediaPhase::Extracted).unwrap(), 1);
        assert_eq!(store.count_media_by_phase(MediaPhase::Uploaded).unwrap(), 0);
    }

    #[test]
    fn test_file_based_store_persists() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("porter.db");

        {
            let store = SqliteStateStore::new(&db_path).unwrap();
            store.upsert_archive(&archive("a1")).unwrap();
            store
                .transition_archive("a1", ArchivePhase::Discovered, ArchivePhase::Downloading)
                .unwrap();
        }

        // Reopen: the committed phase survives.
        let store = SqliteStateStore::new(&db_path).unwrap();
        let fetched = store.get_archive("a1").unwrap().unwrap();
        assert_eq!(fetched.phase, ArchivePhase::Downloading);
    }

    #[test]
    fn test_corrupt_database_is_fatal() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("porter.db");
        std::fs::write(&db_path, b"this is definitely not a sqlite database, not even close")
            .unwrap();

        let result = SqliteStateStore::new(&db_path);
        assert!(matches!(
            result,
            Err(StateError::Corrupt(_)) | Err(StateError::Database(_))
        ));
    }
}
