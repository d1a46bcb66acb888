//! Error types for reportgate.
//!
//! This module defines the stable error codes surfaced to callers and the
//! small error type raised by the type-level helpers in this crate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable error codes.
///
/// Every error raised by the orchestration layer maps onto one of these
/// codes, so callers can branch on the code instead of parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
#[non_exhaustive]
pub enum ErrorCode {
    // =========================================================================
    // Invoice Errors (0x0001 - 0x00FF)
    // =========================================================================
    /// Invoice, attempt or report does not exist
    NotFound = 0x0001,
    /// Operation not permitted in the invoice's current status
    InvalidState = 0x0002,
    /// Competing operation already claimed the invoice
    Conflict = 0x0003,

    // =========================================================================
    // Payment Errors (0x0100 - 0x01FF)
    // =========================================================================
    /// Amount differs from the invoice total
    AmountMismatch = 0x0100,
    /// Payment provider rejected the request
    GatewayRejected = 0x0101,
    /// Payment provider could not be reached
    GatewayUnavailable = 0x0102,
    /// Payment provider credentials were refused
    GatewayUnauthorized = 0x0103,
    /// Provider response could not be understood
    GatewayMalformed = 0x0104,

    // =========================================================================
    // Entitlement Errors (0x0200 - 0x02FF)
    // =========================================================================
    /// Report is missing, expired, or owned by someone else
    NotEntitled = 0x0200,

    // =========================================================================
    // Infrastructure Errors (0x0300 - 0x03FF)
    // =========================================================================
    /// Persistent store failed
    Persistence = 0x0300,
    /// Operation exceeded its deadline
    Timeout = 0x0301,
    /// Configuration is invalid
    Config = 0x0302,
    /// Request parameter was rejected
    InvalidInput = 0x0303,

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal error
    InternalError = 0xFFFF,
}

impl ErrorCode {
    /// Returns true if this is an invoice error (0x0001-0x00FF)
    pub fn is_invoice_error(&self) -> bool {
        let code = *self as u16;
        (0x0001..=0x00FF).contains(&code)
    }

    /// Returns true if this is a payment error (0x0100-0x01FF)
    pub fn is_payment_error(&self) -> bool {
        let code = *self as u16;
        (0x0100..=0x01FF).contains(&code)
    }

    /// Returns true if this is an entitlement error (0x0200-0x02FF)
    pub fn is_entitlement_error(&self) -> bool {
        let code = *self as u16;
        (0x0200..=0x02FF).contains(&code)
    }

    /// Returns true if this is an infrastructure error (0x0300-0x03FF)
    pub fn is_infrastructure_error(&self) -> bool {
        let code = *self as u16;
        (0x0300..=0x03FF).contains(&code)
    }

    /// Get the numeric code value
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// Get a user-facing suggestion for recovering from this error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::NotFound => Some("Check the reference. The invoice or report may have been removed."),
            Self::InvalidState => Some("This invoice can no longer be paid. Create a new invoice."),
            Self::Conflict => Some("A payment for this invoice is already in progress. Finish or verify it first."),
            Self::AmountMismatch => Some("The paid amount does not match the invoice. Contact support with your reference."),
            Self::GatewayRejected => Some("The payment provider declined the request. Check the payment details."),
            Self::GatewayUnavailable => Some("The payment provider is unreachable. Try again in a moment."),
            Self::GatewayUnauthorized => Some("Payment credentials were refused. Check the provider keys."),
            Self::GatewayMalformed => Some("The payment provider sent an unexpected response. Try again later."),
            Self::NotEntitled => Some("This report is not available. It may have expired after 30 days."),
            Self::Persistence => Some("Storage is unavailable. Try again shortly."),
            Self::Timeout => Some("The operation timed out. Verify the payment before retrying."),
            Self::Config => Some("Check the reportgate configuration file."),
            Self::InvalidInput => Some("Check the request parameters."),
            Self::InternalError => Some("An internal error occurred. Please report this issue."),
        }
    }

    /// Get the error category name.
    pub fn category(&self) -> &'static str {
        if self.is_invoice_error() {
            "Invoice"
        } else if self.is_payment_error() {
            "Payment"
        } else if self.is_entitlement_error() {
            "Entitlement"
        } else if self.is_infrastructure_error() {
            "Infrastructure"
        } else {
            "Internal"
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::NotFound => write!(f, "NOT_FOUND"),
            ErrorCode::InvalidState => write!(f, "INVALID_STATE"),
            ErrorCode::Conflict => write!(f, "CONFLICT"),
            ErrorCode::AmountMismatch => write!(f, "AMOUNT_MISMATCH"),
            ErrorCode::GatewayRejected => write!(f, "GATEWAY_REJECTED"),
            ErrorCode::GatewayUnavailable => write!(f, "GATEWAY_UNAVAILABLE"),
            ErrorCode::GatewayUnauthorized => write!(f, "GATEWAY_UNAUTHORIZED"),
            ErrorCode::GatewayMalformed => write!(f, "GATEWAY_MALFORMED"),
            ErrorCode::NotEntitled => write!(f, "NOT_ENTITLED"),
            ErrorCode::Persistence => write!(f, "PERSISTENCE"),
            ErrorCode::Timeout => write!(f, "TIMEOUT"),
            ErrorCode::Config => write!(f, "CONFIG"),
            ErrorCode::InvalidInput => write!(f, "INVALID_INPUT"),
            ErrorCode::InternalError => write!(f, "INTERNAL_ERROR"),
        }
    }
}

/// Errors raised while building or parsing reportgate types.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum TypesError {
    /// Amount does not fit in minor units
    #[error("amount {0} overflows minor units")]
    AmountOverflow(u64),

    /// Minor-unit value is not a whole number of major units
    #[error("minor-unit amount {0} is not a whole major unit")]
    FractionalAmount(u64),

    /// Status string is not a known status
    #[error("unknown {kind} status: {value}")]
    UnknownStatus {
        /// Which status enum was being parsed
        kind: &'static str,
        /// The rejected value
        value: String,
    },

    /// Identifier is not well-formed
    #[error("invalid {kind}: {value}")]
    InvalidIdentifier {
        /// Which identifier was being parsed
        kind: &'static str,
        /// The rejected value
        value: String,
    },
}

impl TypesError {
    /// Create an unknown-status error
    pub fn unknown_status(kind: &'static str, value: impl Into<String>) -> Self {
        Self::UnknownStatus {
            kind,
            value: value.into(),
        }
    }

    /// Create an invalid-identifier error
    pub fn invalid_identifier(kind: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            kind,
            value: value.into(),
        }
    }
}

/// Result type alias for type-level operations
pub type Result<T> = std::result::Result<T, TypesError>;
