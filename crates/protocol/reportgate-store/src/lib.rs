//! Storage layer for the reportgate invoice core.
//!
//! This crate provides persistence for:
//!
//! - **Invoices** (SQLite): the authoritative invoice state machine rows
//! - **Payment attempts** (SQLite): audit trail of every provider call
//! - **User reports** (SQLite): report entitlements with expiry
//! - **Dataset records** (SQLite): the source of truth for lookup data
//! - **Cache** (memory or SQLite): read-through cache for lookup data
//!
//! # Storage Layout
//!
//! ```text
//! ~/.local/share/reportgate/
//! └── reportgate.db            # SQLite: invoices, attempts, reports, cache, dataset
//! ```
//!
//! # Example
//!
//! ```no_run
//! use reportgate_store::{InvoiceStore, ReportStore, ReportStoreConfig};
//! use reportgate_types::{Amount, Invoice, InvoiceRef};
//!
//! let store = ReportStore::open(ReportStoreConfig::new("/tmp/reportgate")).unwrap();
//! let invoice = Invoice::new(InvoiceRef::generate(), 7, Amount::new(20_000), "{}", 0);
//! store.invoices.insert(&invoice).unwrap();
//! assert!(store.invoices.get(&invoice.invoice_ref).unwrap().is_some());
//! ```
//!
//! # Trait-Based Design
//!
//! All storage components are defined as traits so the orchestration layer
//! can be tested against alternative implementations. Store methods are
//! synchronous; async callers run them on the blocking pool.

pub mod attempt;
pub mod cache;
pub mod dataset;
pub mod error;
pub mod invoice;
pub mod report;
pub mod schema;
pub mod traits;

pub use error::{Result, StoreError};

pub use traits::{CacheBackend, DatasetSource, InvoiceStore, PaymentAttemptStore, UserReportStore};

pub use attempt::SqlitePaymentAttemptStore;
pub use cache::{cache_key, CacheStats, CacheStore, MemoryCacheBackend, SqliteCacheBackend};
pub use dataset::{validate_column, SqliteDatasetSource};
pub use invoice::SqliteInvoiceStore;
pub use report::SqliteUserReportStore;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::Connection;

/// Default SQLite busy timeout.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Get the default data directory.
///
/// Priority:
/// 1. `REPORTGATE_DATA_DIR` environment variable (if set)
/// 2. Platform-specific data directory
/// 3. Fallback to `$HOME/.reportgate`
pub fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("REPORTGATE_DATA_DIR") {
        return PathBuf::from(dir);
    }

    directories::ProjectDirs::from("io", "reportgate", "reportgate")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| {
            std::env::var("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(".reportgate")
        })
}

/// Configuration for [`ReportStore`].
#[derive(Debug, Clone)]
pub struct ReportStoreConfig {
    /// Base directory for all data.
    pub base_dir: PathBuf,
    /// Database file path (default: base_dir/reportgate.db).
    pub database_path: Option<PathBuf>,
    /// How long SQLite waits on a locked database before failing.
    pub busy_timeout: Duration,
}

impl ReportStoreConfig {
    /// Create a new configuration with the given base directory.
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            database_path: None,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    /// Set the database path.
    pub fn with_database_path(mut self, path: impl AsRef<Path>) -> Self {
        self.database_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the busy timeout.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Get the database path.
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.base_dir.join("reportgate.db"))
    }
}

/// All storage components over one shared connection.
pub struct ReportStore {
    /// Invoice rows.
    pub invoices: Arc<SqliteInvoiceStore>,
    /// Payment attempt audit trail.
    pub attempts: Arc<SqlitePaymentAttemptStore>,
    /// Report entitlements.
    pub reports: Arc<SqliteUserReportStore>,
    /// Lookup dataset.
    pub dataset: Arc<SqliteDatasetSource>,
    /// Persistent cache backend.
    pub cache_backend: Arc<SqliteCacheBackend>,
    conn: Arc<Mutex<Connection>>,
}

impl ReportStore {
    /// Open the store, creating the directory and schema as needed.
    pub fn open(config: ReportStoreConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.base_dir)?;

        let db_path = config.database_path();
        tracing::info!(db_path = %db_path.display(), "Opening reportgate database");
        let conn = Connection::open(&db_path)?;
        conn.busy_timeout(config.busy_timeout)?;
        schema::initialize_schema(&conn)?;

        Ok(Self::from_connection(conn))
    }

    /// Open a private in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        let conn = Arc::new(Mutex::new(conn));
        Self {
            invoices: Arc::new(SqliteInvoiceStore::new(Arc::clone(&conn))),
            attempts: Arc::new(SqlitePaymentAttemptStore::new(Arc::clone(&conn))),
            reports: Arc::new(SqliteUserReportStore::new(Arc::clone(&conn))),
            dataset: Arc::new(SqliteDatasetSource::new(Arc::clone(&conn))),
            cache_backend: Arc::new(SqliteCacheBackend::new(Arc::clone(&conn))),
            conn,
        }
    }

    /// Get a reference to the shared database connection.
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }
}
