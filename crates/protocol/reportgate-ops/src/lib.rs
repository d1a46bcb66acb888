//! Invoice and payment reconciliation for reportgate.
//!
//! This crate combines the store and a payment provider into the business
//! operations: creating invoices, starting and confirming payments, and
//! deciding who may retrieve which report.
//!
//! # Module Organization
//!
//! - [`ledger`] - Invoice ledger and payment attempt log
//! - [`gateway_client`] - Provider calls with deadlines and audit rows
//! - [`reconciliation`] - Start and confirm payments
//! - [`entitlement`] - Report grants and access checks
//! - [`lookup`] - Cached distinct values and dataset snapshot
//! - [`services`] - Wiring from configuration
//! - [`config`] - TOML configuration
//! - [`logging`] - Tracing subscriber setup
//! - [`error`] - Operation error types
//!
//! # Example
//!
//! ```no_run
//! use reportgate_ops::{ReportGateConfig, Services};
//! use reportgate_types::Amount;
//!
//! # async fn run() -> reportgate_ops::OpsResult<()> {
//! let config = ReportGateConfig::load_default()?;
//! let services = Services::from_config(&config)?;
//!
//! let invoice_ref = services
//!     .ledger
//!     .create_invoice(42, Amount::new(20_000), r#"{"report":"sales"}"#)
//!     .await?;
//! let start = services
//!     .reconciliation
//!     .start_payment(&invoice_ref, "payer@example.com", Amount::new(20_000))
//!     .await?;
//! println!("redirect to {}", start.redirect_url);
//!
//! // Later, from the provider callback
//! let outcome = services.reconciliation.confirm_payment(&start.gateway_ref).await?;
//! if outcome.is_report_eligible() {
//!     println!("report unlocked");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Invoice States
//!
//! ```text
//! PENDING --attach gateway ref--> AWAITING_VERIFICATION --success--> PAID
//!                                                      \--failure--> FAILED
//! ```
//!
//! Every transition is a conditional update on the stored status, so
//! concurrent confirmations of the same payment move the invoice once and
//! grant one report.

pub mod config;
pub mod entitlement;
pub mod error;
pub mod gateway_client;
pub mod ledger;
pub mod logging;
pub mod lookup;
pub mod reconciliation;
pub mod services;

mod helpers;

// Error types
pub use error::{OpsError, OpsResult};

// Configuration
pub use config::{
    default_config_path, CacheBackendKind, CacheConfig, ReportGateConfig, ReportsConfig,
    StorageConfig, TimeoutConfig,
};
pub use logging::init_tracing;

// Services
pub use entitlement::ReportEntitlementGate;
pub use gateway_client::GatewayClient;
pub use ledger::InvoiceLedger;
pub use lookup::LookupService;
pub use reconciliation::{Confirmation, PaymentStart, ReconciliationService};
pub use services::Services;
