//! Flat-file record database
//!
//! One JSON file per table under the configured database directory; rows are
//! plain JSON objects. The core consumes exactly four operations
//! (`get_entries`, `exists`, `add_entry`, `update_entry`) over three tables:
//! `sessions` (keyed by `sessionId`), `animals` (keyed by `id`, carrying the
//! running `nSessions` counter) and `trials` (keyed by `id`, carrying
//! cumulative trial counts). Filters are key/value equality only.
//!
//! Single-writer per database directory; callers serialize concurrent
//! invocations externally.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::{Error, Result};

/// A database row or equality filter: a JSON object.
pub type Row = serde_json::Map<String, Value>;

/// Session bookkeeping table name.
pub const SESSIONS_TABLE: &str = "sessions";
/// Per-animal counters table name.
pub const ANIMALS_TABLE: &str = "animals";
/// Cumulative trial counts table name.
pub const TRIALS_TABLE: &str = "trials";

/// Handle to a flat-file database directory.
#[derive(Debug, Clone)]
pub struct Database {
    root: PathBuf,
}

impl Database {
    /// Open (creating if needed) a database directory.
    ///
    /// # Errors
    ///
    /// IO failure creating the directory.
    pub fn open(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn table_path(&self, table: &str) -> PathBuf {
        self.root.join(format!("{table}.json"))
    }

    fn load_table(&self, table: &str) -> Result<Vec<Row>> {
        let path = self.table_path(table);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents = std::fs::read_to_string(&path)?;
        serde_json::from_str(&contents)
            .map_err(|e| Error::Database(format!("table `{table}` is corrupt: {e}")))
    }

    fn store_table(&self, table: &str, rows: &[Row]) -> Result<()> {
        let contents = serde_json::to_string_pretty(rows)?;
        std::fs::write(self.table_path(table), contents)?;
        Ok(())
    }

    fn matches(row: &Row, filter: &Row) -> bool {
        filter
            .iter()
            .all(|(key, expected)| row.get(key) == Some(expected))
    }

    /// Rows of `table` matching every key/value pair in `filter`.
    ///
    /// # Errors
    ///
    /// IO failure or a corrupt table file.
    pub fn get_entries(&self, filter: &Row, table: &str) -> Result<Vec<Row>> {
        Ok(self
            .load_table(table)?
            .into_iter()
            .filter(|row| Self::matches(row, filter))
            .collect())
    }

    /// Whether any row of `table` matches `filter`.
    ///
    /// # Errors
    ///
    /// Same as [`get_entries`](Self::get_entries).
    pub fn exists(&self, filter: &Row, table: &str) -> Result<bool> {
        Ok(self
            .load_table(table)?
            .iter()
            .any(|row| Self::matches(row, filter)))
    }

    /// Append a row to `table`.
    ///
    /// # Errors
    ///
    /// IO failure or a corrupt table file.
    pub fn add_entry(&self, row: Row, table: &str) -> Result<()> {
        let mut rows = self.load_table(table)?;
        rows.push(row);
        self.store_table(table, &rows)
    }

    /// Merge `patch` into every row of `table` matching `filter`, returning
    /// how many rows were updated (possibly zero).
    ///
    /// # Errors
    ///
    /// IO failure or a corrupt table file.
    pub fn update_entry(&self, filter: &Row, patch: &Row, table: &str) -> Result<usize> {
        let mut rows = self.load_table(table)?;
        let mut updated = 0;
        for row in &mut rows {
            if Self::matches(row, filter) {
                for (key, value) in patch {
                    row.insert(key.clone(), value.clone());
                }
                updated += 1;
            }
        }
        if updated > 0 {
            self.store_table(table, &rows)?;
        }
        Ok(updated)
    }
}

/// Build a row/filter from key/value pairs.
#[must_use]
pub fn row(pairs: &[(&str, Value)]) -> Row {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}
