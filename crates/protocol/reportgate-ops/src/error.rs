//! Error types for the operations layer.
//!
//! Every variant carries the invoice ref, gateway ref or report id that the
//! failing operation was working on, so a log line alone is enough to find
//! the affected rows.

use std::time::Duration;

use reportgate_gateway::GatewayError;
use reportgate_store::StoreError;
use reportgate_types::{ErrorCode, GatewayRef, InvoiceRef, InvoiceStatus};
use thiserror::Error;

/// Result type for operations.
pub type OpsResult<T> = std::result::Result<T, OpsError>;

/// Errors that can occur during invoice and payment operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OpsError {
    // =========================================================================
    // Invoice Errors
    // =========================================================================
    /// Unknown invoice ref or gateway ref.
    #[error("not found: {0}")]
    NotFound(String),

    /// A different gateway ref is already attached to the invoice.
    #[error("invoice {invoice_ref} already has gateway ref {attached}")]
    Conflict {
        /// The invoice
        invoice_ref: InvoiceRef,
        /// The ref already attached
        attached: GatewayRef,
        /// The ref that was refused, if the provider issued one
        requested: Option<GatewayRef>,
    },

    /// The invoice's status does not permit the operation.
    #[error("cannot {operation} invoice {reference} in status {status}")]
    InvalidState {
        /// Invoice ref or gateway ref
        reference: String,
        /// Current status
        status: InvoiceStatus,
        /// Operation that was refused
        operation: &'static str,
    },

    // =========================================================================
    // Payment Errors
    // =========================================================================
    /// Amount differs from the invoice total.
    #[error("amount mismatch for {reference}: expected {expected}, got {actual}")]
    AmountMismatch {
        /// Invoice ref or gateway ref
        reference: String,
        /// What the invoice requires
        expected: String,
        /// What was offered or reported
        actual: String,
    },

    /// Payment provider failed or refused the call.
    #[error("gateway error for {reference}: {source}")]
    Gateway {
        /// Invoice ref, gateway ref or payer email
        reference: String,
        /// Underlying provider error
        #[source]
        source: GatewayError,
    },

    // =========================================================================
    // Entitlement Errors
    // =========================================================================
    /// The caller may not retrieve the report.
    #[error("not entitled: {0}")]
    NotEntitled(String),

    // =========================================================================
    // Infrastructure Errors
    // =========================================================================
    /// Store read or write failed.
    #[error("persistence error during {context}: {source}")]
    Persistence {
        /// Operation and reference
        context: String,
        /// Underlying store error
        #[source]
        source: StoreError,
    },

    /// Operation exceeded its deadline.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Operation and reference
        operation: String,
        /// Deadline that elapsed
        after: Duration,
    },

    /// A request parameter was rejected.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Configuration could not be loaded or is incomplete.
    #[error("configuration error: {0}")]
    Config(String),
}

impl OpsError {
    /// Create a not found error.
    pub fn not_found(reference: impl std::fmt::Display) -> Self {
        OpsError::NotFound(reference.to_string())
    }

    /// Create a not entitled error.
    pub fn not_entitled(reason: impl Into<String>) -> Self {
        OpsError::NotEntitled(reason.into())
    }

    /// Create a persistence error.
    pub fn persistence(context: impl Into<String>, source: StoreError) -> Self {
        OpsError::Persistence {
            context: context.into(),
            source,
        }
    }

    /// Create a gateway error.
    pub fn gateway(reference: impl std::fmt::Display, source: GatewayError) -> Self {
        OpsError::Gateway {
            reference: reference.to_string(),
            source,
        }
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        OpsError::Config(msg.into())
    }

    /// Get the stable error code for this error.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::Conflict { .. } => ErrorCode::Conflict,
            Self::InvalidState { .. } => ErrorCode::InvalidState,
            Self::AmountMismatch { .. } => ErrorCode::AmountMismatch,
            Self::Gateway { source, .. } => source.error_code(),
            Self::NotEntitled(_) => ErrorCode::NotEntitled,
            Self::Persistence { .. } => ErrorCode::Persistence,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::InvalidInput(_) => ErrorCode::InvalidInput,
            Self::Config(_) => ErrorCode::Config,
        }
    }

    /// Get a user-friendly suggestion for recovering from this error.
    pub fn suggestion(&self) -> &'static str {
        self.error_code()
            .suggestion()
            .unwrap_or("An internal error occurred. Please report this issue.")
    }

    /// Message safe to show an end user.
    ///
    /// Never includes refs, statuses or provider bodies.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Conflict { .. } | Self::InvalidState { .. } => "This invoice cannot be modified.",
            Self::NotFound(_) => "We could not find that invoice.",
            Self::AmountMismatch { .. } => {
                "The payment amount does not match the invoice. Please contact support."
            }
            Self::Gateway { source, .. } if source.is_retryable() => {
                "The payment provider is not responding. Please try again shortly."
            }
            Self::Gateway { .. } => "The payment provider declined the request.",
            Self::NotEntitled(_) => "This report is not available.",
            Self::Timeout { .. } => {
                "Payment not yet confirmed. Please try again shortly."
            }
            Self::Persistence { .. } | Self::Config(_) => {
                "Something went wrong on our side. Please try again shortly."
            }
            Self::InvalidInput(_) => "The request was not valid.",
        }
    }

    /// Returns true if the same call may succeed when retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Persistence { source, .. } => source.is_retryable(),
            Self::Gateway { source, .. } => source.is_retryable(),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }
}
