use chrono::Utc;
use log::info;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

use super::AnnotationStorage;
use crate::error::GalleryError;

/// SQLite-backed annotation storage.
/// One row per key, the payload is the serialized annotation set.
pub struct SqliteStorage {
    conn: Connection,
    db_path: Option<PathBuf>,
}

impl SqliteStorage {
    /// Open (or create) the database file and make sure the schema exists.
    pub fn open(db_path: &Path) -> Result<Self, GalleryError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                GalleryError::Persistence(format!(
                    "Failed to create {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let conn = Connection::open(db_path)?;
        info!("Annotation database opened at: {}", db_path.display());

        let storage = SqliteStorage {
            conn,
            db_path: Some(db_path.to_path_buf()),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    /// Throwaway database, for tests and previews
    pub fn open_in_memory() -> Result<Self, GalleryError> {
        let storage = SqliteStorage {
            conn: Connection::open_in_memory()?,
            db_path: None,
        };
        storage.init_schema()?;
        Ok(storage)
    }

    fn init_schema(&self) -> Result<(), GalleryError> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS annotations (
                key             TEXT PRIMARY KEY,
                payload         TEXT NOT NULL,
                updated_at      INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    /// Path to the database file (`None` for in-memory databases)
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Number of stored annotation sets
    pub fn key_count(&self) -> Result<i64, GalleryError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM annotations", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Unix timestamp of the last write under `key`
    pub fn updated_at(&self, key: &str) -> Result<Option<i64>, GalleryError> {
        let updated = self
            .conn
            .query_row(
                "SELECT updated_at FROM annotations WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(updated)
    }
}

impl AnnotationStorage for SqliteStorage {
    fn read(&self, key: &str) -> Result<Option<String>, GalleryError> {
        let payload = self
            .conn
            .query_row(
                "SELECT payload FROM annotations WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(payload)
    }

    fn write(&self, key: &str, value: &str) -> Result<(), GalleryError> {
        self.conn.execute(
            "INSERT INTO annotations (key, payload, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET payload = excluded.payload,
                                            updated_at = excluded.updated_at",
            params![key, value, Utc::now().timestamp()],
        )?;
        Ok(())
    }
}

impl std::fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStorage")
            .field("db_path", &self.db_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_reads_none() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        assert_eq!(storage.read("ann_1").unwrap(), None);
        assert_eq!(storage.updated_at("ann_1").unwrap(), None);
        assert_eq!(storage.key_count().unwrap(), 0);
    }

    #[test]
    fn test_write_is_an_upsert() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        storage.write("ann_1", "[]").unwrap();
        storage.write("ann_1", r#"[{"id":"a"}]"#).unwrap();
        storage.write("ann_2", "[]").unwrap();

        assert_eq!(storage.key_count().unwrap(), 2);
        assert_eq!(storage.read("ann_1").unwrap().as_deref(), Some(r#"[{"id":"a"}]"#));
        assert!(storage.updated_at("ann_1").unwrap().is_some());
    }

    #[test]
    fn test_file_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("annotations.db");

        {
            let storage = SqliteStorage::open(&db_path).unwrap();
            assert_eq!(storage.path(), Some(db_path.as_path()));
            storage.write("ann_7", "[]").unwrap();
        }

        let reopened = SqliteStorage::open(&db_path).unwrap();
        assert_eq!(reopened.read("ann_7").unwrap().as_deref(), Some("[]"));
    }
}
