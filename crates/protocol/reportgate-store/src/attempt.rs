//! Payment attempt storage.

use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

use reportgate_types::{
    Amount, AttemptStatus, GatewayRef, InvoiceRef, PaymentAttempt, Timestamp,
};

use crate::error::{Result, StoreError};
use crate::traits::PaymentAttemptStore;

const ATTEMPT_COLUMNS: &str = "id, invoice_ref, gateway_ref, email, amount, status, \
     gateway_response, raw_response, redirect_url, created_at, updated_at";

/// SQLite-based payment attempt store.
pub struct SqlitePaymentAttemptStore {
    conn: Arc<Mutex<Connection>>,
}

struct AttemptRow {
    id: i64,
    invoice_ref: Option<String>,
    gateway_ref: Option<String>,
    email: String,
    amount: i64,
    status: String,
    gateway_response: Option<String>,
    raw_response: Option<String>,
    redirect_url: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl AttemptRow {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            invoice_ref: row.get(1)?,
            gateway_ref: row.get(2)?,
            email: row.get(3)?,
            amount: row.get(4)?,
            status: row.get(5)?,
            gateway_response: row.get(6)?,
            raw_response: row.get(7)?,
            redirect_url: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn into_attempt(self) -> Result<PaymentAttempt> {
        let amount = u64::try_from(self.amount)
            .map_err(|_| StoreError::invalid_data(format!("negative amount {}", self.amount)))?;
        Ok(PaymentAttempt {
            id: self.id,
            invoice_ref: self
                .invoice_ref
                .as_deref()
                .map(InvoiceRef::parse)
                .transpose()?,
            gateway_ref: self.gateway_ref.map(GatewayRef::new).transpose()?,
            email: self.email,
            amount: Amount::new(amount),
            status: self.status.parse()?,
            gateway_response: self.gateway_response,
            raw_response: self.raw_response,
            redirect_url: self.redirect_url,
            created_at: self.created_at as Timestamp,
            updated_at: self.updated_at as Timestamp,
        })
    }
}

impl SqlitePaymentAttemptStore {
    /// Create a new attempt store with the given database connection.
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::lock_poisoned("database connection lock poisoned"))
    }

    fn list_where(&self, column: &str, key: &str) -> Result<Vec<PaymentAttempt>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM payment_attempts WHERE {column} = ?1 ORDER BY id ASC"
        ))?;
        let rows = stmt
            .query_map([key], AttemptRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(AttemptRow::into_attempt).collect()
    }

    /// Total number of recorded attempts.
    pub fn count(&self) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM payment_attempts", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl PaymentAttemptStore for SqlitePaymentAttemptStore {
    fn record(&self, attempt: &PaymentAttempt) -> Result<i64> {
        let conn = self.lock()?;
        let amount = i64::try_from(attempt.amount.major_units())
            .map_err(|_| StoreError::invalid_data("attempt amount exceeds storage range"))?;

        conn.execute(
            "INSERT INTO payment_attempts
                (invoice_ref, gateway_ref, email, amount, status, gateway_response,
                 raw_response, redirect_url, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                attempt.invoice_ref.as_ref().map(InvoiceRef::as_str),
                attempt.gateway_ref.as_ref().map(GatewayRef::as_str),
                attempt.email,
                amount,
                attempt.status.as_str(),
                attempt.gateway_response,
                attempt.raw_response,
                attempt.redirect_url,
                attempt.created_at as i64,
                attempt.updated_at as i64,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    fn update_verification(
        &self,
        gateway_ref: &GatewayRef,
        status: Option<AttemptStatus>,
        gateway_response: &str,
        raw_response: &str,
        now: Timestamp,
    ) -> Result<usize> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE payment_attempts
             SET status = COALESCE(?2, status), gateway_response = ?3, raw_response = ?4, updated_at = ?5
             WHERE gateway_ref = ?1 AND status != ?6",
            params![
                gateway_ref.as_str(),
                status.map(|s| s.as_str()),
                gateway_response,
                raw_response,
                now as i64,
                AttemptStatus::NetworkError.as_str(),
            ],
        )?;
        Ok(changed)
    }

    fn list_for_invoice(&self, invoice_ref: &InvoiceRef) -> Result<Vec<PaymentAttempt>> {
        self.list_where("invoice_ref", invoice_ref.as_str())
    }

    fn list_for_gateway_ref(&self, gateway_ref: &GatewayRef) -> Result<Vec<PaymentAttempt>> {
        self.list_where("gateway_ref", gateway_ref.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::initialize_schema;

    fn setup() -> SqlitePaymentAttemptStore {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        SqlitePaymentAttemptStore::new(Arc::new(Mutex::new(conn)))
    }

    fn attempt(
        invoice_ref: &InvoiceRef,
        gateway_ref: Option<&str>,
        status: AttemptStatus,
    ) -> PaymentAttempt {
        PaymentAttempt {
            id: 0,
            invoice_ref: Some(invoice_ref.clone()),
            gateway_ref: gateway_ref.map(|g| GatewayRef::new(g).unwrap()),
            email: "a@b.com".to_string(),
            amount: Amount::new(20_000),
            status,
            gateway_response: None,
            raw_response: None,
            redirect_url: gateway_ref.map(|g| format!("https://checkout.test/{g}")),
            created_at: 1_000,
            updated_at: 1_000,
        }
    }

    #[test]
    fn test_record_and_list() {
        let store = setup();
        let inv = InvoiceRef::generate();
        let id1 = store
            .record(&attempt(&inv, None, AttemptStatus::Failed))
            .unwrap();
        let id2 = store
            .record(&attempt(&inv, Some("T1"), AttemptStatus::Initialized))
            .unwrap();
        assert!(id2 > id1);

        let list = store.list_for_invoice(&inv).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].status, AttemptStatus::Failed);
        assert!(list[0].gateway_ref.is_none());
        assert_eq!(list[1].id, id2);
        assert_eq!(list[1].redirect_url.as_deref(), Some("https://checkout.test/T1"));
    }

    #[test]
    fn test_update_in_place() {
        let store = setup();
        let inv = InvoiceRef::generate();
        let g = GatewayRef::new("T1").unwrap();
        store
            .record(&attempt(&inv, Some("T1"), AttemptStatus::Initialized))
            .unwrap();

        let changed = store
            .update_verification(&g, Some(AttemptStatus::Success), "Approved", "{}", 2_000)
            .unwrap();
        assert_eq!(changed, 1);

        let list = store.list_for_gateway_ref(&g).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].status, AttemptStatus::Success);
        assert_eq!(list[0].gateway_response.as_deref(), Some("Approved"));
        assert_eq!(list[0].updated_at, 2_000);
        assert_eq!(list[0].created_at, 1_000);
    }

    #[test]
    fn test_pending_keeps_status() {
        let store = setup();
        let inv = InvoiceRef::generate();
        let g = GatewayRef::new("T1").unwrap();
        store
            .record(&attempt(&inv, Some("T1"), AttemptStatus::Initialized))
            .unwrap();

        store
            .update_verification(&g, None, "ongoing", "{}", 2_000)
            .unwrap();
        let list = store.list_for_gateway_ref(&g).unwrap();
        assert_eq!(list[0].status, AttemptStatus::Initialized);
        assert_eq!(list[0].gateway_response.as_deref(), Some("ongoing"));
    }

    #[test]
    fn test_network_error_rows_untouched() {
        let store = setup();
        let inv = InvoiceRef::generate();
        let g = GatewayRef::new("T1").unwrap();
        store
            .record(&attempt(&inv, Some("T1"), AttemptStatus::Initialized))
            .unwrap();
        store
            .record(&attempt(&inv, Some("T1"), AttemptStatus::NetworkError))
            .unwrap();

        let changed = store
            .update_verification(&g, Some(AttemptStatus::Failed), "Declined", "{}", 2_000)
            .unwrap();
        assert_eq!(changed, 1);

        let list = store.list_for_gateway_ref(&g).unwrap();
        assert_eq!(list[0].status, AttemptStatus::Failed);
        assert_eq!(list[1].status, AttemptStatus::NetworkError);
        assert_eq!(store.count().unwrap(), 2);
    }
}
