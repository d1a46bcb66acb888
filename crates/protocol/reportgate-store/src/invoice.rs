//! Invoice storage.
//!
//! Status changes are single `UPDATE ... WHERE status = ?` statements; the
//! affected-row count tells the caller whether its transition won.

use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

use reportgate_types::{
    Amount, GatewayRef, Invoice, InvoiceRef, InvoiceStatus, Timestamp, UserId,
};

use crate::error::{is_unique_violation, Result, StoreError};
use crate::traits::InvoiceStore;

const INVOICE_COLUMNS: &str =
    "ref, user_id, total, status, gateway_ref, payload, failure_reason, created_at, updated_at";

/// SQLite-based invoice store.
pub struct SqliteInvoiceStore {
    conn: Arc<Mutex<Connection>>,
}

/// Raw column values, decoded outside the rusqlite row callback.
struct InvoiceRow {
    invoice_ref: String,
    user_id: i64,
    total: i64,
    status: String,
    gateway_ref: Option<String>,
    payload: String,
    failure_reason: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl InvoiceRow {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            invoice_ref: row.get(0)?,
            user_id: row.get(1)?,
            total: row.get(2)?,
            status: row.get(3)?,
            gateway_ref: row.get(4)?,
            payload: row.get(5)?,
            failure_reason: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_invoice(self) -> Result<Invoice> {
        let total = u64::try_from(self.total)
            .map_err(|_| StoreError::invalid_data(format!("negative total {}", self.total)))?;
        Ok(Invoice {
            invoice_ref: InvoiceRef::parse(&self.invoice_ref)?,
            user_id: self.user_id as UserId,
            total: Amount::new(total),
            payload: self.payload,
            gateway_ref: self.gateway_ref.map(GatewayRef::new).transpose()?,
            status: self.status.parse()?,
            failure_reason: self.failure_reason,
            created_at: self.created_at as Timestamp,
            updated_at: self.updated_at as Timestamp,
        })
    }
}

impl SqliteInvoiceStore {
    /// Create a new invoice store with the given database connection.
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::lock_poisoned("database connection lock poisoned"))
    }

    fn query_one(conn: &Connection, clause: &str, key: &str) -> Result<Option<Invoice>> {
        let row = conn
            .query_row(
                &format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE {clause} = ?1"),
                [key],
                InvoiceRow::from_row,
            )
            .optional()?;
        row.map(InvoiceRow::into_invoice).transpose()
    }

    /// Count invoices in a status.
    pub fn count_by_status(&self, status: InvoiceStatus) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM invoices WHERE status = ?1",
            [status.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

impl InvoiceStore for SqliteInvoiceStore {
    fn insert(&self, invoice: &Invoice) -> Result<()> {
        let conn = self.lock()?;
        let total = i64::try_from(invoice.total.major_units())
            .map_err(|_| StoreError::invalid_data("invoice total exceeds storage range"))?;

        conn.execute(
            "INSERT INTO invoices (ref, user_id, total, status, gateway_ref, payload, failure_reason, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                invoice.invoice_ref.as_str(),
                invoice.user_id,
                total,
                invoice.status.as_str(),
                invoice.gateway_ref.as_ref().map(GatewayRef::as_str),
                invoice.payload,
                invoice.failure_reason,
                invoice.created_at as i64,
                invoice.updated_at as i64,
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Duplicate(invoice.invoice_ref.to_string())
            } else {
                StoreError::Database(e)
            }
        })?;

        Ok(())
    }

    fn get(&self, invoice_ref: &InvoiceRef) -> Result<Option<Invoice>> {
        let conn = self.lock()?;
        Self::query_one(&conn, "ref", invoice_ref.as_str())
    }

    fn get_by_gateway_ref(&self, gateway_ref: &GatewayRef) -> Result<Option<Invoice>> {
        let conn = self.lock()?;
        Self::query_one(&conn, "gateway_ref", gateway_ref.as_str())
    }

    fn list_for_user(&self, user_id: UserId) -> Result<Vec<Invoice>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE user_id = ?1
             ORDER BY created_at DESC, rowid DESC"
        ))?;

        let rows = stmt
            .query_map([user_id], InvoiceRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(InvoiceRow::into_invoice).collect()
    }

    fn attach_gateway_ref(
        &self,
        invoice_ref: &InvoiceRef,
        gateway_ref: &GatewayRef,
        now: Timestamp,
    ) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE invoices
                 SET gateway_ref = ?2, status = ?3, updated_at = ?4
                 WHERE ref = ?1 AND status = ?5 AND gateway_ref IS NULL",
                params![
                    invoice_ref.as_str(),
                    gateway_ref.as_str(),
                    InvoiceStatus::AwaitingVerification.as_str(),
                    now as i64,
                    InvoiceStatus::Pending.as_str(),
                ],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Duplicate(gateway_ref.to_string())
                } else {
                    StoreError::Database(e)
                }
            })?;

        Ok(changed == 1)
    }

    fn transition(
        &self,
        gateway_ref: &GatewayRef,
        from: InvoiceStatus,
        to: InvoiceStatus,
        failure_reason: Option<&str>,
        now: Timestamp,
    ) -> Result<bool> {
        if !from.can_transition_to(to) {
            return Err(StoreError::invalid_data(format!(
                "illegal transition {from} -> {to}"
            )));
        }

        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE invoices
             SET status = ?3, failure_reason = COALESCE(?4, failure_reason), updated_at = ?5
             WHERE gateway_ref = ?1 AND status = ?2",
            params![
                gateway_ref.as_str(),
                from.as_str(),
                to.as_str(),
                failure_reason,
                now as i64,
            ],
        )?;

        Ok(changed == 1)
    }
}
