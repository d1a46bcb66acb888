//! Error types for the storage layer.

use reportgate_types::TypesError;
use rusqlite::ErrorCode as SqliteCode;
use thiserror::Error;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error while preparing the data directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A row with the same unique key already exists.
    #[error("Duplicate key: {0}")]
    Duplicate(String),

    /// Column name rejected by the dataset source.
    #[error("Invalid column: {0}")]
    InvalidColumn(String),

    /// Schema initialization error.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Stored data could not be decoded.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Lock poisoning error.
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    /// Blocking task failed to complete.
    #[error("background task failed: {0}")]
    Task(String),
}

impl StoreError {
    /// Create a schema error.
    pub fn schema(msg: impl Into<String>) -> Self {
        StoreError::Schema(msg.into())
    }

    /// Create an invalid data error.
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        StoreError::InvalidData(msg.into())
    }

    /// Create a lock poisoned error.
    pub fn lock_poisoned(msg: impl Into<String>) -> Self {
        StoreError::LockPoisoned(msg.into())
    }

    /// Create a task error.
    pub fn task(msg: impl Into<String>) -> Self {
        StoreError::Task(msg.into())
    }

    /// Whether retrying the same call may succeed.
    ///
    /// Busy/locked databases and I/O hiccups are transient; constraint
    /// violations and corrupt rows are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Io(_) | StoreError::Task(_) => true,
            StoreError::Database(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                SqliteCode::DatabaseBusy | SqliteCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    /// True for primary-key or unique-index violations.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            StoreError::Duplicate(_) => true,
            StoreError::Database(err) => is_unique_violation(err),
            _ => false,
        }
    }
}

impl From<TypesError> for StoreError {
    fn from(err: TypesError) -> Self {
        StoreError::InvalidData(err.to_string())
    }
}

/// True when a SQLite error is a primary-key or unique constraint failure.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.code == SqliteCode::ConstraintViolation
                && (e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_failure(code: std::os::raw::c_int) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(code), None)
    }

    #[test]
    fn test_error_display() {
        let err = StoreError::Duplicate("INV-AB12CD34".to_string());
        assert!(err.to_string().contains("Duplicate key"));
    }

    #[test]
    fn test_busy_is_retryable() {
        let err = StoreError::Database(sqlite_failure(rusqlite::ffi::SQLITE_BUSY));
        assert!(err.is_retryable());

        let err = StoreError::Database(sqlite_failure(rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE));
        assert!(!err.is_retryable());
        assert!(err.is_unique_violation());
    }

    #[test]
    fn test_invalid_data_not_retryable() {
        assert!(!StoreError::invalid_data("bad status").is_retryable());
        assert!(!StoreError::lock_poisoned("conn").is_retryable());
    }

    #[test]
    fn test_from_types_error() {
        let err: StoreError = TypesError::unknown_status("invoice", "X").into();
        assert!(matches!(err, StoreError::InvalidData(_)));
    }
}
