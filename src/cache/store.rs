//! Durable prediction store
//!
//! Keyed by `(model identity, context bytes)`; values are little-endian
//! `f32` blobs. Every write runs inside its own transaction, so a reader
//! sees either the complete row or nothing.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS prediction (
    model        TEXT NOT NULL,
    context      BLOB NOT NULL,
    distribution BLOB NOT NULL,
    PRIMARY KEY (model, context)
);
";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open store '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("prediction store connection was poisoned by a panicking writer")]
    Poisoned,
}

/// Second cache tier, shared by both predictor sides.
pub trait PredictionStore: Send + Sync {
    /// `Ok(None)` is a miss, not an error.
    fn get(&self, model: &str, context: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Insert or replace one entry atomically.
    fn put(&self, model: &str, context: &[u8], distribution: &[u8]) -> Result<(), StoreError>;

    /// Remove every entry for `model`, returning how many were removed.
    fn purge(&self, model: &str) -> Result<usize, StoreError>;

    /// Number of entries stored for `model`.
    fn count(&self, model: &str) -> Result<usize, StoreError>;
}

/// SQLite-backed [`PredictionStore`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the store. Failure here is a fatal configuration
    /// error for the caller.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let open_error = |source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        };
        let conn = Connection::open(path).map_err(open_error)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(open_error)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(open_error)?;
        conn.execute_batch(SCHEMA_SQL).map_err(open_error)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Private, non-persistent store.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl PredictionStore for SqliteStore {
    fn get(&self, model: &str, context: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let conn = self.conn()?;
        let value = conn
            .query_row(
                "SELECT distribution FROM prediction WHERE model = ?1 AND context = ?2",
                params![model, context],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put(&self, model: &str, context: &[u8], distribution: &[u8]) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO prediction (model, context, distribution)
             VALUES (?1, ?2, ?3)",
            params![model, context, distribution],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn purge(&self, model: &str) -> Result<usize, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let removed = tx.execute("DELETE FROM prediction WHERE model = ?1", params![model])?;
        tx.commit()?;
        Ok(removed)
    }

    fn count(&self, model: &str) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM prediction WHERE model = ?1",
            params![model],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_entries_are_misses() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.get("fwd", &[1, 2, 3]).unwrap(), None);
    }

    #[test]
    fn entries_are_keyed_by_model_and_context() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put("fwd", &[1, 2], &[0, 0, 128, 63]).unwrap();
        assert_eq!(store.get("fwd", &[1, 2]).unwrap(), Some(vec![0, 0, 128, 63]));
        assert_eq!(store.get("bwd", &[1, 2]).unwrap(), None);
        assert_eq!(store.get("fwd", &[2, 1]).unwrap(), None);

        store.put("fwd", &[1, 2], &[1, 1, 1, 1]).unwrap();
        assert_eq!(store.get("fwd", &[1, 2]).unwrap(), Some(vec![1, 1, 1, 1]));
        assert_eq!(store.count("fwd").unwrap(), 1);
    }

    #[test]
    fn entries_survive_reopening() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("predictions.sqlite3");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.put("fwd", &[9; 4], &[7; 8]).unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.get("fwd", &[9; 4]).unwrap(), Some(vec![7; 8]));
    }

    #[test]
    fn purge_only_touches_one_model() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put("fwd", &[1], &[0; 4]).unwrap();
        store.put("fwd", &[2], &[0; 4]).unwrap();
        store.put("bwd", &[1], &[0; 4]).unwrap();
        assert_eq!(store.purge("fwd").unwrap(), 2);
        assert_eq!(store.count("fwd").unwrap(), 0);
        assert_eq!(store.count("bwd").unwrap(), 1);
    }

    #[test]
    fn unreachable_store_fails_at_open() {
        let tmp = TempDir::new().unwrap();
        // A directory where the database file should be.
        let path = tmp.path().join("db");
        std::fs::create_dir_all(&path).unwrap();
        assert!(matches!(
            SqliteStore::open(&path),
            Err(StoreError::Open { .. })
        ));
    }
}
