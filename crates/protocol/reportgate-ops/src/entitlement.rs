//! Report entitlements.
//!
//! A grant is created at most once per paid invoice and is never deleted.
//! Expiry is a read-time filter.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use reportgate_store::{ReportStore, StoreError, UserReportStore};
use reportgate_types::{
    current_timestamp, Invoice, InvoiceRef, InvoiceStatus, ReportId, UserId, UserReport,
};

use crate::error::{OpsError, OpsResult};
use crate::helpers::run_store;

/// Fresh report ids tried before a grant gives up.
const REPORT_ID_ATTEMPTS: usize = 3;

/// Decides who may retrieve which report.
pub struct ReportEntitlementGate {
    reports: Arc<dyn UserReportStore>,
    retention_days: u64,
    store_timeout: Duration,
}

impl ReportEntitlementGate {
    /// Create a gate granting reports for `retention_days`.
    pub fn new(
        reports: Arc<dyn UserReportStore>,
        retention_days: u64,
        store_timeout: Duration,
    ) -> Self {
        Self {
            reports,
            retention_days,
            store_timeout,
        }
    }

    /// Create a gate over a [`ReportStore`].
    pub fn from_store(store: &ReportStore, retention_days: u64, store_timeout: Duration) -> Self {
        Self::new(store.reports.clone(), retention_days, store_timeout)
    }

    /// Days a grant stays accessible.
    pub fn retention_days(&self) -> u64 {
        self.retention_days
    }

    /// Grant the report for a paid invoice, or return the existing grant.
    pub async fn grant_if_paid(&self, invoice: &Invoice) -> OpsResult<UserReport> {
        self.grant_if_paid_named(invoice, None).await
    }

    /// Like [`grant_if_paid`](Self::grant_if_paid), naming a new grant.
    ///
    /// An existing grant keeps its original name.
    pub async fn grant_if_paid_named(
        &self,
        invoice: &Invoice,
        report_name: Option<String>,
    ) -> OpsResult<UserReport> {
        if invoice.status != InvoiceStatus::Paid {
            return Err(OpsError::not_entitled(format!(
                "invoice {} is {}",
                invoice.invoice_ref, invoice.status
            )));
        }

        let reports = Arc::clone(&self.reports);
        let (user_id, invoice_ref) = (invoice.user_id, invoice.invoice_ref.clone());
        let retention_days = self.retention_days;

        let (report, created) = run_store(
            self.store_timeout,
            format!("grant report for {}", invoice.invoice_ref),
            move || {
                if let Some(existing) = reports.get_by_invoice(&invoice_ref)? {
                    return Ok((Some(existing), false));
                }
                let report = UserReport::new(
                    user_id,
                    invoice_ref.clone(),
                    report_name,
                    current_timestamp(),
                    retention_days,
                );
                if let Some(report) = insert_with_fresh_id(reports.as_ref(), report)? {
                    return Ok((Some(report), true));
                }
                // Lost a race with another grant, or the stored invoice is not paid
                Ok((reports.get_by_invoice(&invoice_ref)?, false))
            },
        )
        .await?;

        let report = report.ok_or_else(|| {
            OpsError::not_entitled(format!("invoice {} is not paid", invoice.invoice_ref))
        })?;
        if report.user_id != invoice.user_id {
            return Err(OpsError::not_entitled(format!(
                "report for {} belongs to another user",
                invoice.invoice_ref
            )));
        }

        if created {
            info!(
                report_id = %report.report_id,
                invoice_ref = %report.invoice_ref,
                user_id = report.user_id,
                expires_at = report.expires_at,
                "Report entitlement granted"
            );
        } else {
            debug!(report_id = %report.report_id, "Existing report entitlement returned");
        }
        Ok(report)
    }

    /// Whether the report is still inside its retention window.
    pub fn is_accessible(&self, report: &UserReport) -> bool {
        report.is_accessible_at(current_timestamp())
    }

    /// Unexpired reports of a user, newest first.
    pub async fn reports_for_user(&self, user_id: UserId) -> OpsResult<Vec<UserReport>> {
        let reports = Arc::clone(&self.reports);
        run_store(
            self.store_timeout,
            format!("list reports of user {}", user_id),
            move || reports.list_accessible(user_id, current_timestamp()),
        )
        .await
    }

    /// The grant for an invoice, if one exists (expired or not).
    pub async fn report_for_invoice(&self, invoice_ref: &InvoiceRef) -> OpsResult<Option<UserReport>> {
        let reports = Arc::clone(&self.reports);
        let r = invoice_ref.clone();
        run_store(
            self.store_timeout,
            format!("load report for {}", invoice_ref),
            move || reports.get_by_invoice(&r),
        )
        .await
    }

    /// Return the report if `user_id` owns it and it has not expired.
    pub async fn authorize(&self, report_id: &ReportId, user_id: UserId) -> OpsResult<UserReport> {
        let reports = Arc::clone(&self.reports);
        let id = report_id.clone();
        let report = run_store(
            self.store_timeout,
            format!("load report {}", report_id),
            move || reports.get(&id),
        )
        .await?
        .ok_or_else(|| OpsError::not_entitled(format!("report {} does not exist", report_id)))?;

        if report.user_id != user_id {
            return Err(OpsError::not_entitled(format!(
                "report {} belongs to another user",
                report_id
            )));
        }
        if !self.is_accessible(&report) {
            return Err(OpsError::not_entitled(format!("report {} has expired", report_id)));
        }
        Ok(report)
    }
}

/// Insert a grant, drawing a new report id whenever the current one is
/// already taken. `None` means the invoice is not grantable or already has
/// a grant.
fn insert_with_fresh_id(
    reports: &dyn UserReportStore,
    mut report: UserReport,
) -> reportgate_store::Result<Option<UserReport>> {
    for _ in 0..REPORT_ID_ATTEMPTS {
        match reports.insert_if_paid(&report) {
            Ok(true) => return Ok(Some(report)),
            Ok(false) => return Ok(None),
            Err(StoreError::Duplicate(taken)) => {
                warn!(report_id = %taken, invoice_ref = %report.invoice_ref, "Report id taken, drawing another");
                report.report_id = ReportId::generate();
            }
            Err(e) => return Err(e),
        }
    }
    Err(StoreError::Duplicate(report.report_id.to_string()))
}

impl std::fmt::Debug for ReportEntitlementGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportEntitlementGate")
            .field("retention_days", &self.retention_days)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InvoiceLedger;
    use reportgate_types::{Amount, GatewayRef, MILLIS_PER_DAY, REPORT_RETENTION_DAYS};

    const TIMEOUT: Duration = Duration::from_secs(5);

    struct Fixture {
        ledger: InvoiceLedger,
        gate: ReportEntitlementGate,
    }

    fn fixture() -> Fixture {
        let store = ReportStore::open_in_memory().unwrap();
        Fixture {
            ledger: InvoiceLedger::from_store(&store, TIMEOUT),
            gate: ReportEntitlementGate::from_store(&store, REPORT_RETENTION_DAYS, TIMEOUT),
        }
    }

    async fn paid_invoice(f: &Fixture, gateway_ref: &str) -> Invoice {
        let g = GatewayRef::new(gateway_ref).unwrap();
        let r = f
            .ledger
            .create_invoice(7, Amount::new(20_000), "{}")
            .await
            .unwrap();
        f.ledger.attach_gateway_ref(&r, &g).await.unwrap();
        f.ledger.mark_paid(&g).await.unwrap()
    }

    #[tokio::test]
    async fn test_grant_requires_paid() {
        let f = fixture();
        let r = f
            .ledger
            .create_invoice(7, Amount::new(20_000), "{}")
            .await
            .unwrap();
        let pending = f.ledger.get(&r).await.unwrap();

        assert!(matches!(
            f.gate.grant_if_paid(&pending).await,
            Err(OpsError::NotEntitled(_))
        ));
        assert!(f.gate.report_for_invoice(&r).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_taken_report_id_is_redrawn() {
        let f = fixture();
        let first = paid_invoice(&f, "T-1").await;
        let second = paid_invoice(&f, "T-2").await;
        let existing = f.gate.grant_if_paid(&first).await.unwrap();

        let mut report = UserReport::new(7, second.invoice_ref.clone(), None, current_timestamp(), 30);
        report.report_id = existing.report_id.clone();
        let granted = insert_with_fresh_id(f.gate.reports.as_ref(), report)
            .unwrap()
            .expect("paid invoice is granted");
        assert_ne!(granted.report_id, existing.report_id);

        let stored = f.gate.report_for_invoice(&second.invoice_ref).await.unwrap().unwrap();
        assert_eq!(stored.report_id, granted.report_id);
        assert_eq!(f.gate.grant_if_paid(&second).await.unwrap().report_id, granted.report_id);
    }

    #[tokio::test]
    async fn test_grant_twice_returns_same_report() {
        let f = fixture();
        let invoice = paid_invoice(&f, "T-1").await;

        let first = f.gate.grant_if_paid(&invoice).await.unwrap();
        let second = f
            .gate
            .grant_if_paid_named(&invoice, Some("Q3 sales".into()))
            .await
            .unwrap();

        assert_eq!(first.report_id, second.report_id);
        assert!(second.report_name.is_none());
        assert_eq!(first.expires_at - first.created_at, 30 * MILLIS_PER_DAY);
    }

    #[tokio::test]
    async fn test_stale_paid_snapshot_not_trusted() {
        // In-memory copy says PAID but the stored row does not
        let f = fixture();
        let r = f
            .ledger
            .create_invoice(7, Amount::new(10), "{}")
            .await
            .unwrap();
        let mut forged = f.ledger.get(&r).await.unwrap();
        forged.status = InvoiceStatus::Paid;

        assert!(matches!(
            f.gate.grant_if_paid(&forged).await,
            Err(OpsError::NotEntitled(_))
        ));
    }

    #[tokio::test]
    async fn test_authorize_checks_owner() {
        let f = fixture();
        let invoice = paid_invoice(&f, "T-1").await;
        let report = f.gate.grant_if_paid(&invoice).await.unwrap();

        let ok = f.gate.authorize(&report.report_id, 7).await.unwrap();
        assert_eq!(ok.invoice_ref, invoice.invoice_ref);

        assert!(matches!(
            f.gate.authorize(&report.report_id, 8).await,
            Err(OpsError::NotEntitled(_))
        ));
        assert!(matches!(
            f.gate.authorize(&ReportId::from_stored("RPT-UNKNOWN00000"), 7).await,
            Err(OpsError::NotEntitled(_))
        ));
    }

    #[tokio::test]
    async fn test_is_accessible_window() {
        let f = fixture();
        let invoice = paid_invoice(&f, "T-1").await;
        let mut report = f.gate.grant_if_paid(&invoice).await.unwrap();
        assert!(f.gate.is_accessible(&report));

        report.expires_at = current_timestamp().saturating_sub(1);
        assert!(!f.gate.is_accessible(&report));
    }

    #[tokio::test]
    async fn test_reports_for_user_lists_grants() {
        let f = fixture();
        let a = paid_invoice(&f, "T-1").await;
        let b = paid_invoice(&f, "T-2").await;
        f.gate.grant_if_paid(&a).await.unwrap();
        f.gate.grant_if_paid(&b).await.unwrap();

        assert_eq!(f.gate.reports_for_user(7).await.unwrap().len(), 2);
        assert!(f.gate.reports_for_user(8).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_retention_is_immediately_inaccessible() {
        let store = ReportStore::open_in_memory().unwrap();
        let ledger = InvoiceLedger::from_store(&store, TIMEOUT);
        let gate = ReportEntitlementGate::from_store(&store, 0, TIMEOUT);

        let g = GatewayRef::new("T-0").unwrap();
        let r = ledger.create_invoice(7, Amount::new(1), "{}").await.unwrap();
        ledger.attach_gateway_ref(&r, &g).await.unwrap();
        let invoice = ledger.mark_paid(&g).await.unwrap();

        let report = gate.grant_if_paid(&invoice).await.unwrap();
        assert!(!gate.is_accessible(&report));
        assert!(gate.reports_for_user(7).await.unwrap().is_empty());
        assert!(matches!(
            gate.authorize(&report.report_id, 7).await,
            Err(OpsError::NotEntitled(_))
        ));
    }
}
