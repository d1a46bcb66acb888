//! Report entitlement storage.

use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

use reportgate_types::{InvoiceRef, InvoiceStatus, ReportId, Timestamp, UserId, UserReport};

use crate::error::{is_unique_violation, Result, StoreError};
use crate::traits::UserReportStore;

const REPORT_COLUMNS: &str =
    "report_id, user_id, invoice_ref, report_name, created_at, expires_at";

/// SQLite-based report store.
pub struct SqliteUserReportStore {
    conn: Arc<Mutex<Connection>>,
}

struct ReportRow {
    report_id: String,
    user_id: i64,
    invoice_ref: String,
    report_name: Option<String>,
    created_at: i64,
    expires_at: i64,
}

impl ReportRow {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            report_id: row.get(0)?,
            user_id: row.get(1)?,
            invoice_ref: row.get(2)?,
            report_name: row.get(3)?,
            created_at: row.get(4)?,
            expires_at: row.get(5)?,
        })
    }

    fn into_report(self) -> Result<UserReport> {
        Ok(UserReport {
            report_id: ReportId::from_stored(self.report_id),
            user_id: self.user_id as UserId,
            invoice_ref: InvoiceRef::parse(&self.invoice_ref)?,
            report_name: self.report_name,
            created_at: self.created_at as Timestamp,
            expires_at: self.expires_at as Timestamp,
        })
    }
}

impl SqliteUserReportStore {
    /// Create a new report store with the given database connection.
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::lock_poisoned("database connection lock poisoned"))
    }

    fn query_one(&self, column: &str, key: &str) -> Result<Option<UserReport>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("SELECT {REPORT_COLUMNS} FROM user_reports WHERE {column} = ?1"),
                [key],
                ReportRow::from_row,
            )
            .optional()?;
        row.map(ReportRow::into_report).transpose()
    }

    /// Number of reports ever granted, expired ones included.
    pub fn count(&self) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM user_reports", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl UserReportStore for SqliteUserReportStore {
    fn insert_if_paid(&self, report: &UserReport) -> Result<bool> {
        let conn = self.lock()?;
        // The PAID check and the insert are one statement
        // Only a second grant for the invoice is absorbed; an id collision is an error
        let changed = conn
            .execute(
                "INSERT INTO user_reports
                    (report_id, user_id, invoice_ref, report_name, created_at, expires_at)
                 SELECT ?1, ?2, ?3, ?4, ?5, ?6
                 WHERE EXISTS (
                    SELECT 1 FROM invoices WHERE ref = ?3 AND user_id = ?2 AND status = ?7
                 )
                 ON CONFLICT(invoice_ref) DO NOTHING",
                params![
                    report.report_id.as_str(),
                    report.user_id,
                    report.invoice_ref.as_str(),
                    report.report_name,
                    report.created_at as i64,
                    report.expires_at as i64,
                    InvoiceStatus::Paid.as_str(),
                ],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Duplicate(report.report_id.to_string())
                } else {
                    StoreError::Database(e)
                }
            })?;
        Ok(changed == 1)
    }

    fn get_by_invoice(&self, invoice_ref: &InvoiceRef) -> Result<Option<UserReport>> {
        self.query_one("invoice_ref", invoice_ref.as_str())
    }

    fn get(&self, report_id: &ReportId) -> Result<Option<UserReport>> {
        self.query_one("report_id", report_id.as_str())
    }

    fn list_accessible(&self, user_id: UserId, now: Timestamp) -> Result<Vec<UserReport>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {REPORT_COLUMNS} FROM user_reports
             WHERE user_id = ?1 AND expires_at > ?2
             ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rows = stmt
            .query_map(params![user_id, now as i64], ReportRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(ReportRow::into_report).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice::SqliteInvoiceStore;
    use crate::schema::initialize_schema;
    use crate::traits::InvoiceStore;
    use reportgate_types::{Amount, GatewayRef, Invoice, REPORT_RETENTION_DAYS};

    struct Fixture {
        invoices: SqliteInvoiceStore,
        reports: SqliteUserReportStore,
    }

    fn setup() -> Fixture {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        Fixture {
            invoices: SqliteInvoiceStore::new(Arc::clone(&conn)),
            reports: SqliteUserReportStore::new(conn),
        }
    }

    fn paid_invoice(f: &Fixture, user_id: UserId, gateway_ref: &str) -> InvoiceRef {
        let inv = Invoice::new(InvoiceRef::generate(), user_id, Amount::new(100), "{}", 1_000);
        f.invoices.insert(&inv).unwrap();
        let g = GatewayRef::new(gateway_ref).unwrap();
        f.invoices
            .attach_gateway_ref(&inv.invoice_ref, &g, 1_001)
            .unwrap();
        f.invoices
            .transition(
                &g,
                InvoiceStatus::AwaitingVerification,
                InvoiceStatus::Paid,
                None,
                1_002,
            )
            .unwrap();
        inv.invoice_ref
    }

    #[test]
    fn test_insert_requires_paid_invoice() {
        let f = setup();
        let inv = Invoice::new(InvoiceRef::generate(), 7, Amount::new(100), "{}", 1_000);
        f.invoices.insert(&inv).unwrap();

        let report = UserReport::new(7, inv.invoice_ref.clone(), None, 2_000, REPORT_RETENTION_DAYS);
        assert!(!f.reports.insert_if_paid(&report).unwrap());
        assert!(f.reports.get_by_invoice(&inv.invoice_ref).unwrap().is_none());
    }

    #[test]
    fn test_insert_rejects_other_user() {
        let f = setup();
        let inv_ref = paid_invoice(&f, 7, "T1");
        let report = UserReport::new(8, inv_ref, None, 2_000, REPORT_RETENTION_DAYS);
        assert!(!f.reports.insert_if_paid(&report).unwrap());
    }

    #[test]
    fn test_one_report_per_invoice() {
        let f = setup();
        let inv_ref = paid_invoice(&f, 7, "T1");

        let first = UserReport::new(7, inv_ref.clone(), None, 2_000, REPORT_RETENTION_DAYS);
        let second = UserReport::new(7, inv_ref.clone(), None, 3_000, REPORT_RETENTION_DAYS);
        assert!(f.reports.insert_if_paid(&first).unwrap());
        assert!(!f.reports.insert_if_paid(&second).unwrap());

        let stored = f.reports.get_by_invoice(&inv_ref).unwrap().unwrap();
        assert_eq!(stored.report_id, first.report_id);
        assert_eq!(f.reports.count().unwrap(), 1);
    }

    #[test]
    fn test_report_id_collision_is_an_error() {
        let f = setup();
        let first_ref = paid_invoice(&f, 7, "T1");
        let second_ref = paid_invoice(&f, 7, "T2");

        let first = UserReport::new(7, first_ref, None, 2_000, REPORT_RETENTION_DAYS);
        assert!(f.reports.insert_if_paid(&first).unwrap());

        let mut clash = UserReport::new(7, second_ref.clone(), None, 3_000, REPORT_RETENTION_DAYS);
        clash.report_id = first.report_id.clone();
        assert!(matches!(
            f.reports.insert_if_paid(&clash),
            Err(StoreError::Duplicate(_))
        ));
        assert!(f.reports.get_by_invoice(&second_ref).unwrap().is_none());
    }

    #[test]
    fn test_list_accessible_filters_expired() {
        let f = setup();
        let old_ref = paid_invoice(&f, 7, "T1");
        let new_ref = paid_invoice(&f, 7, "T2");

        let old = UserReport::new(7, old_ref, Some("Q1".into()), 0, 1);
        let new = UserReport::new(7, new_ref, None, 10_000, REPORT_RETENTION_DAYS);
        f.reports.insert_if_paid(&old).unwrap();
        f.reports.insert_if_paid(&new).unwrap();

        let now = old.expires_at;
        let visible = f.reports.list_accessible(7, now).unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].report_id, new.report_id);

        // Expired rows are kept
        assert!(f.reports.get(&old.report_id).unwrap().is_some());
        assert_eq!(f.reports.count().unwrap(), 2);
    }
}
