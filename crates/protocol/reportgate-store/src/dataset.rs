//! Lookup dataset storage.
//!
//! Records are JSON objects kept in one table. Column lookups go through
//! SQLite's `json_extract`, so any key present in the records can be
//! queried for distinct values.

use rusqlite::{params, Connection};
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};

use reportgate_types::current_timestamp;

use crate::error::{Result, StoreError};
use crate::traits::DatasetSource;

/// Longest accepted column name.
const MAX_COLUMN_LEN: usize = 64;

/// Check that `column` is a plain identifier.
///
/// Accepts ASCII letters, digits and underscores, not starting with a digit.
pub fn validate_column(column: &str) -> Result<()> {
    let mut chars = column.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
                && column.len() <= MAX_COLUMN_LEN
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidColumn(column.to_string()))
    }
}

/// SQLite-backed dataset source.
pub struct SqliteDatasetSource {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDatasetSource {
    /// Create a new dataset source with the given database connection.
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::lock_poisoned("database connection lock poisoned"))
    }
}

impl DatasetSource for SqliteDatasetSource {
    fn insert_record(&self, record: &Map<String, Value>) -> Result<i64> {
        for column in record.keys() {
            validate_column(column)?;
        }
        let data = serde_json::to_string(record)?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO dataset_records (data, created_at) VALUES (?1, ?2)",
            params![data, current_timestamp() as i64],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn distinct_values(&self, column: &str) -> Result<Vec<String>> {
        validate_column(column)?;
        let path = format!("$.{column}");

        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT CAST(json_extract(data, ?1) AS TEXT) AS v
             FROM dataset_records
             WHERE json_extract(data, ?1) IS NOT NULL
             ORDER BY v ASC",
        )?;
        let values = stmt
            .query_map([path], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(values)
    }

    fn snapshot(&self) -> Result<Vec<Value>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT data FROM dataset_records ORDER BY id ASC")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.iter()
            .map(|data| serde_json::from_str(data).map_err(StoreError::from))
            .collect()
    }
}
