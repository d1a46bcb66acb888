//! Data structures for the reportgate invoice and payment core.
//!
//! This crate provides the types shared by every reportgate crate. It
//! contains no I/O and no orchestration, only type definitions, the state
//! machine rules they carry, and serialization support.
//!
//! # Module Organization
//!
//! - [`amount`] - Major/minor currency unit handling
//! - [`constants`] - Retention windows, reference formats, default timeouts
//! - [`error`] - Error codes and the shared type-level error
//! - [`invoice`] - Invoice records, references and the status state machine
//! - [`payment`] - Payment attempts and provider verification results
//! - [`report`] - Report entitlements
//!
//! # Example
//!
//! ```
//! use reportgate_types::{Amount, Invoice, InvoiceRef, InvoiceStatus};
//!
//! let invoice = Invoice::new(
//!     InvoiceRef::generate(),
//!     7,
//!     Amount::new(20_000),
//!     r#"{"report_group":"Demographics"}"#,
//!     1_700_000_000_000,
//! );
//!
//! assert_eq!(invoice.status, InvoiceStatus::Pending);
//! assert_eq!(invoice.total.to_minor_units().unwrap(), 2_000_000);
//! assert!(InvoiceStatus::Pending.can_transition_to(InvoiceStatus::AwaitingVerification));
//! assert!(!InvoiceStatus::Paid.can_transition_to(InvoiceStatus::Pending));
//! ```
//!
//! # Type Conventions
//!
//! - Status enums serialize to the exact strings persisted in the store
//!   (`PENDING`, `success`, ...) and parse back with `FromStr`
//! - Timestamps are Unix milliseconds (`Timestamp`)
//! - Identifiers are newtypes so an invoice ref can never be passed where a
//!   gateway ref is expected

/// Crate version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod amount;
pub mod constants;
pub mod error;
pub mod invoice;
pub mod payment;
pub mod report;

pub use amount::Amount;
pub use constants::*;
pub use error::{ErrorCode, Result, TypesError};
pub use invoice::{GatewayRef, Invoice, InvoiceRef, InvoiceStatus};
pub use payment::{AttemptStatus, PaymentAttempt, TransactionInit, Verification, VerificationStatus};
pub use report::{ReportId, UserReport};

/// Unix timestamp in milliseconds.
pub type Timestamp = u64;

/// Identifier of a dashboard user.
pub type UserId = i64;

/// Current Unix time in milliseconds.
///
/// Returns 0 if the system clock is before the epoch.
pub fn current_timestamp() -> Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Timestamp)
        .unwrap_or(0)
}
