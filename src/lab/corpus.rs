//! Corpus of vectorized source files with fold assignments
//!
//! Rows are addressable by content hash or by 1-based rowid. A file belongs
//! to at most one fold; assigning it twice, or assigning a hash that was
//! never inserted, is an integrity error.

use crate::cache::StoreError;
use crate::vector::TokenVector;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// One stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusEntry {
    pub hash: String,
    pub vector: TokenVector,
}

pub struct VectorStore {
    conn: Connection,
}

impl VectorStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(include_str!("corpus_schema.sql"))?;
        Ok(Self { conn })
    }

    /// Insert a file. Returns `false` when the hash is already present.
    pub fn insert(
        &mut self,
        hash: &str,
        vector: &TokenVector,
        source: &[u8],
    ) -> Result<bool, StoreError> {
        let n_tokens = vector.len().saturating_sub(2) as i64;
        let tx = self.conn.transaction()?;
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO vectorized_source (hash, array, n_tokens) VALUES (?1, ?2, ?3)",
            params![hash, vector.to_bytes(), n_tokens],
        )?;
        if inserted > 0 {
            tx.execute(
                "INSERT INTO source_text (hash, content) VALUES (?1, ?2)",
                params![hash, source],
            )?;
        }
        tx.commit()?;
        Ok(inserted > 0)
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM vectorized_source", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    pub fn get_by_hash(&self, hash: &str) -> Result<Option<TokenVector>, StoreError> {
        let blob = self
            .conn
            .query_row(
                "SELECT array FROM vectorized_source WHERE hash = ?1",
                params![hash],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(blob.map(|bytes| TokenVector::from_bytes(&bytes)))
    }

    /// Rowids start at 1.
    pub fn get_by_rowid(&self, rowid: i64) -> Result<Option<CorpusEntry>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT hash, array FROM vectorized_source WHERE rowid = ?1",
                params![rowid],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?)),
            )
            .optional()?;
        Ok(row.map(|(hash, bytes)| CorpusEntry {
            hash,
            vector: TokenVector::from_bytes(&bytes),
        }))
    }

    pub fn source_of(&self, hash: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let content = self
            .conn
            .query_row(
                "SELECT content FROM source_text WHERE hash = ?1",
                params![hash],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(content)
    }

    /// `None` while the corpus is empty.
    pub fn min_index(&self) -> Result<Option<i64>, StoreError> {
        Ok(self
            .conn
            .query_row("SELECT MIN(rowid) FROM vectorized_source", [], |row| row.get(0))?)
    }

    pub fn max_index(&self) -> Result<Option<i64>, StoreError> {
        Ok(self
            .conn
            .query_row("SELECT MAX(rowid) FROM vectorized_source", [], |row| row.get(0))?)
    }

    /// Hashes assigned to `fold`, in assignment order. Empty, not an
    /// error, when nothing has been assigned.
    pub fn hashes_in_fold(&self, fold: u32) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT hash FROM fold_assignment WHERE fold = ?1 ORDER BY rowid")?;
        let hashes = stmt
            .query_map(params![fold], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(hashes)
    }

    pub fn files_in_fold(&self, fold: u32) -> Result<Vec<CorpusEntry>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT v.hash, v.array
               FROM fold_assignment f JOIN vectorized_source v USING (hash)
              WHERE f.fold = ?1
              ORDER BY f.rowid",
        )?;
        let entries = stmt
            .query_map(params![fold], |row| {
                Ok(CorpusEntry {
                    hash: row.get(0)?,
                    vector: TokenVector::from_bytes(&row.get::<_, Vec<u8>>(1)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Tokens (sentinels excluded) across every file in `fold`.
    pub fn ntokens_in_fold(&self, fold: u32) -> Result<u64, StoreError> {
        let total: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(n_tokens), 0)
               FROM vectorized_source JOIN fold_assignment USING (hash)
              WHERE fold = ?1",
            params![fold],
            |row| row.get(0),
        )?;
        Ok(total as u64)
    }

    /// Hashes not assigned to any fold, in insertion order.
    pub fn unassigned_files(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT hash FROM vectorized_source
              WHERE hash NOT IN (SELECT hash FROM fold_assignment)
              ORDER BY rowid",
        )?;
        let hashes = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(hashes)
    }

    pub fn add_to_fold(&mut self, hash: &str, fold: u32) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO fold_assignment (hash, fold) VALUES (?1, ?2)",
            params![hash, fold],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Distribute every unassigned file over `folds` folds, round-robin in
    /// hash order. Returns how many files were assigned.
    pub fn assign_folds(&mut self, folds: u32) -> Result<usize, StoreError> {
        if folds == 0 {
            return Ok(0);
        }
        let mut hashes = self.unassigned_files()?;
        hashes.sort();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare("INSERT INTO fold_assignment (hash, fold) VALUES (?1, ?2)")?;
            for (i, hash) in hashes.iter().enumerate() {
                stmt.execute(params![hash, (i as u32) % folds])?;
            }
        }
        tx.commit()?;
        Ok(hashes.len())
    }

    /// Distinct fold numbers, ascending.
    pub fn fold_ids(&self) -> Result<Vec<u32>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT fold FROM fold_assignment ORDER BY fold")?;
        let folds = stmt
            .query_map([], |row| row.get::<_, u32>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(folds)
    }

    pub fn has_fold_assignments(&self) -> Result<bool, StoreError> {
        Ok(!self.fold_ids()?.is_empty())
    }

    /// Remove every fold assignment; stored files are kept.
    pub fn destroy_fold_assignments(&mut self) -> Result<usize, StoreError> {
        let tx = self.conn.transaction()?;
        let removed = tx.execute("DELETE FROM fold_assignment", [])?;
        tx.commit()?;
        Ok(removed)
    }
}
