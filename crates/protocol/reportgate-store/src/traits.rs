//! Trait definitions for storage components.
//!
//! Implementations may vary (e.g., in-memory vs SQLite) but must satisfy
//! these interfaces. Every mutating method that guards a state transition
//! is a single conditional statement and reports whether it took effect,
//! so concurrent callers can tell the winner from the losers without
//! application-level locks.

use reportgate_types::{
    AttemptStatus, GatewayRef, Invoice, InvoiceRef, InvoiceStatus, PaymentAttempt, ReportId,
    Timestamp, UserId, UserReport,
};
use serde_json::{Map, Value};

use crate::error::Result;

// =============================================================================
// Invoices
// =============================================================================

/// Persistent invoice records.
pub trait InvoiceStore: Send + Sync {
    /// Insert a new invoice.
    ///
    /// Fails with [`StoreError::Duplicate`](crate::StoreError::Duplicate) if
    /// the ref is already taken.
    fn insert(&self, invoice: &Invoice) -> Result<()>;

    /// Load an invoice by ref.
    fn get(&self, invoice_ref: &InvoiceRef) -> Result<Option<Invoice>>;

    /// Load the invoice a gateway ref is attached to.
    fn get_by_gateway_ref(&self, gateway_ref: &GatewayRef) -> Result<Option<Invoice>>;

    /// All invoices of a user, newest first.
    fn list_for_user(&self, user_id: UserId) -> Result<Vec<Invoice>>;

    /// Attach a gateway ref and move `PENDING -> AWAITING_VERIFICATION`.
    ///
    /// Returns `false` when the invoice is not `PENDING` or already has a
    /// gateway ref. Fails with `Duplicate` when the gateway ref belongs to
    /// another invoice.
    fn attach_gateway_ref(
        &self,
        invoice_ref: &InvoiceRef,
        gateway_ref: &GatewayRef,
        now: Timestamp,
    ) -> Result<bool>;

    /// Move the invoice holding `gateway_ref` from `from` to `to`.
    ///
    /// Returns `false` when the invoice was not in `from`.
    fn transition(
        &self,
        gateway_ref: &GatewayRef,
        from: InvoiceStatus,
        to: InvoiceStatus,
        failure_reason: Option<&str>,
        now: Timestamp,
    ) -> Result<bool>;
}

// =============================================================================
// Payment Attempts
// =============================================================================

/// Audit trail of provider calls.
pub trait PaymentAttemptStore: Send + Sync {
    /// Append an attempt and return its row id. `attempt.id` is ignored.
    fn record(&self, attempt: &PaymentAttempt) -> Result<i64>;

    /// Update the live attempt for `gateway_ref` with a verification result.
    ///
    /// `status` of `None` keeps the current status and only refreshes the
    /// provider response. Rows recorded as `network_error` are never
    /// touched. Returns the number of rows updated.
    fn update_verification(
        &self,
        gateway_ref: &GatewayRef,
        status: Option<AttemptStatus>,
        gateway_response: &str,
        raw_response: &str,
        now: Timestamp,
    ) -> Result<usize>;

    /// Attempts made for an invoice, oldest first.
    fn list_for_invoice(&self, invoice_ref: &InvoiceRef) -> Result<Vec<PaymentAttempt>>;

    /// Attempts recorded under a gateway ref, oldest first.
    fn list_for_gateway_ref(&self, gateway_ref: &GatewayRef) -> Result<Vec<PaymentAttempt>>;
}

// =============================================================================
// Report Entitlements
// =============================================================================

/// Persistent report grants.
pub trait UserReportStore: Send + Sync {
    /// Insert `report` only if its invoice is `PAID`, owned by the same
    /// user, and has no report yet.
    ///
    /// Returns `true` when a row was written. A `report_id` already taken
    /// by another grant fails with [`StoreError::Duplicate`].
    fn insert_if_paid(&self, report: &UserReport) -> Result<bool>;

    /// The report granted for an invoice, expired or not.
    fn get_by_invoice(&self, invoice_ref: &InvoiceRef) -> Result<Option<UserReport>>;

    /// Load a report by id, expired or not.
    fn get(&self, report_id: &ReportId) -> Result<Option<UserReport>>;

    /// A user's reports still open at `now`, newest first.
    fn list_accessible(&self, user_id: UserId, now: Timestamp) -> Result<Vec<UserReport>>;
}

// =============================================================================
// Lookup Dataset
// =============================================================================

/// Source of truth for read-mostly lookup data.
pub trait DatasetSource: Send + Sync {
    /// Append one record (a JSON object) and return its row id.
    fn insert_record(&self, record: &Map<String, Value>) -> Result<i64>;

    /// Distinct non-null values of `column`, sorted.
    fn distinct_values(&self, column: &str) -> Result<Vec<String>>;

    /// Every record, in insertion order.
    fn snapshot(&self) -> Result<Vec<Value>>;
}

// =============================================================================
// Cache Backend
// =============================================================================

/// Key/value storage behind [`CacheStore`](crate::CacheStore).
///
/// Values are serialized JSON. Backends must treat an entry whose
/// `expires_at` is not after `now` as absent.
pub trait CacheBackend: Send + Sync {
    /// Fetch a live entry.
    fn get(&self, key: &str, now: Timestamp) -> Result<Option<String>>;

    /// Insert or replace an entry.
    fn put(&self, key: &str, value: &str, expires_at: Timestamp) -> Result<()>;

    /// Remove an entry. Missing keys are not an error.
    fn remove(&self, key: &str) -> Result<()>;

    /// Remove every entry whose key starts with `prefix`, returning the count.
    fn remove_prefix(&self, prefix: &str) -> Result<u64>;

    /// Drop expired entries, returning how many were removed.
    fn purge_expired(&self, now: Timestamp) -> Result<u64>;
}
