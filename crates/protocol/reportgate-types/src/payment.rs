//! Payment attempt and verification types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::error::{Result, TypesError};
use crate::invoice::{GatewayRef, InvoiceRef};
use crate::Timestamp;

/// Status of a payment attempt, mirroring the provider's own vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    /// Provider transaction created
    Initialized,
    /// Provider confirmed payment
    Success,
    /// Provider reported a failure
    Failed,
    /// Provider could not be reached
    NetworkError,
}

impl AttemptStatus {
    /// Stored string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::NetworkError => "network_error",
        }
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttemptStatus {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "initialized" => Ok(Self::Initialized),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "network_error" => Ok(Self::NetworkError),
            other => Err(TypesError::unknown_status("attempt", other)),
        }
    }
}

/// Outcome of verifying a transaction with the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    /// Payment completed
    Success,
    /// Payment explicitly failed or was abandoned
    Failed,
    /// Outcome not known yet
    Pending,
}

impl VerificationStatus {
    /// Stored string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Pending => "pending",
        }
    }

    /// Attempt status to record for this outcome, if it changes one.
    pub fn attempt_status(&self) -> Option<AttemptStatus> {
        match self {
            Self::Success => Some(AttemptStatus::Success),
            Self::Failed => Some(AttemptStatus::Failed),
            Self::Pending => None,
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One call to the payment provider, kept for audit.
///
/// Attempts are created on initialization and updated in place on
/// verification. They are never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAttempt {
    /// Row identifier
    pub id: i64,
    /// Invoice the attempt was made for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_ref: Option<InvoiceRef>,
    /// Provider transaction (absent when initialization failed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_ref: Option<GatewayRef>,
    /// Payer email
    pub email: String,
    /// Amount in major units
    pub amount: Amount,
    /// Latest known status
    pub status: AttemptStatus,
    /// Provider's human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_response: Option<String>,
    /// Provider's raw response body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
    /// Checkout URL handed to the payer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    /// Creation time
    pub created_at: Timestamp,
    /// Last update
    pub updated_at: Timestamp,
}

/// A transaction the provider has initialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionInit {
    /// Provider transaction identifier
    pub gateway_ref: GatewayRef,
    /// Checkout URL for the payer
    pub redirect_url: String,
    /// Provider's raw response body
    pub raw_response: String,
}

/// Result of verifying a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    /// Normalized outcome
    pub status: VerificationStatus,
    /// Provider's human-readable message
    pub gateway_response: String,
    /// Amount the provider says was paid, in minor units
    pub amount_minor: Option<u64>,
    /// Provider's raw response body
    pub raw_response: String,
}
