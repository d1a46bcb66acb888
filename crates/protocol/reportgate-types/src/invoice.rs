//! Invoice types.
//!
//! An invoice requests payment for exactly one report. Its status only
//! ever moves forward:
//!
//! ```text
//! PENDING -> AWAITING_VERIFICATION -> PAID
//!                                  \-> FAILED
//! ```

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::constants::{INVOICE_REF_PREFIX, INVOICE_REF_SUFFIX_LEN, REF_ALPHABET};
use crate::error::{Result, TypesError};
use crate::{Timestamp, UserId};

/// Draw `len` characters from [`REF_ALPHABET`].
pub(crate) fn random_suffix(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| REF_ALPHABET[rng.gen_range(0..REF_ALPHABET.len())] as char)
        .collect()
}

/// Invoice reference, `INV-` followed by eight uppercase alphanumerics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InvoiceRef(String);

impl InvoiceRef {
    /// Generate a fresh random reference.
    ///
    /// Uniqueness is enforced by the store's primary key; callers retry on
    /// collision.
    pub fn generate() -> Self {
        Self(format!(
            "{}{}",
            INVOICE_REF_PREFIX,
            random_suffix(INVOICE_REF_SUFFIX_LEN)
        ))
    }

    /// Parse and validate a reference.
    pub fn parse(value: &str) -> Result<Self> {
        let suffix = value
            .strip_prefix(INVOICE_REF_PREFIX)
            .ok_or_else(|| TypesError::invalid_identifier("invoice ref", value))?;
        let well_formed = suffix.len() == INVOICE_REF_SUFFIX_LEN
            && suffix.bytes().all(|b| REF_ALPHABET.contains(&b));
        if !well_formed {
            return Err(TypesError::invalid_identifier("invoice ref", value));
        }
        Ok(Self(value.to_string()))
    }

    /// The reference as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InvoiceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for InvoiceRef {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for InvoiceRef {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<InvoiceRef> for String {
    fn from(value: InvoiceRef) -> Self {
        value.0
    }
}

/// The payment provider's transaction identifier.
///
/// Opaque to reportgate; only checked for emptiness.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GatewayRef(String);

impl GatewayRef {
    /// Wrap a provider reference.
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(TypesError::invalid_identifier("gateway ref", value));
        }
        Ok(Self(value))
    }

    /// The reference as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GatewayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for GatewayRef {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Invoice status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    /// Created, no provider transaction yet
    Pending,
    /// Provider transaction initialized, outcome unknown
    AwaitingVerification,
    /// Provider confirmed payment
    Paid,
    /// Provider reported an explicit failure
    Failed,
}

impl InvoiceStatus {
    /// Stored string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::AwaitingVerification => "AWAITING_VERIFICATION",
            Self::Paid => "PAID",
            Self::Failed => "FAILED",
        }
    }

    /// `PAID` and `FAILED` are terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Paid | Self::Failed)
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(&self, next: InvoiceStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::AwaitingVerification)
                | (Self::AwaitingVerification, Self::Paid)
                | (Self::AwaitingVerification, Self::Failed)
        )
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "AWAITING_VERIFICATION" => Ok(Self::AwaitingVerification),
            "PAID" => Ok(Self::Paid),
            "FAILED" => Ok(Self::Failed),
            other => Err(TypesError::unknown_status("invoice", other)),
        }
    }
}

/// A billing record requesting payment for one report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    /// Primary identifier, never reused
    pub invoice_ref: InvoiceRef,
    /// Owner of the invoice
    pub user_id: UserId,
    /// Amount due in major units
    pub total: Amount,
    /// Opaque JSON describing the requested report, returned verbatim
    pub payload: String,
    /// Provider transaction, set once and never changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_ref: Option<GatewayRef>,
    /// Current status
    pub status: InvoiceStatus,
    /// Provider message recorded when the invoice failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Creation time
    pub created_at: Timestamp,
    /// Last status change
    pub updated_at: Timestamp,
}

impl Invoice {
    /// Create a new `PENDING` invoice.
    pub fn new(
        invoice_ref: InvoiceRef,
        user_id: UserId,
        total: Amount,
        payload: impl Into<String>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            invoice_ref,
            user_id,
            total,
            payload: payload.into(),
            gateway_ref: None,
            status: InvoiceStatus::Pending,
            failure_reason: None,
            created_at,
            updated_at: created_at,
        }
    }

    /// True once payment has been confirmed.
    pub fn is_paid(&self) -> bool {
        self.status == InvoiceStatus::Paid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_ref_format() {
        for _ in 0..50 {
            let r = InvoiceRef::generate();
            assert!(r.as_str().starts_with("INV-"));
            assert_eq!(r.as_str().len(), 12);
            assert!(InvoiceRef::parse(r.as_str()).is_ok());
        }
    }

    #[test]
    fn test_parse_ref_rejects_malformed() {
        assert!(InvoiceRef::parse("INV-AB12CD34").is_ok());
        assert!(InvoiceRef::parse("INV-ab12cd34").is_err());
        assert!(InvoiceRef::parse("INV-AB12").is_err());
        assert!(InvoiceRef::parse("RPT-AB12CD34").is_err());
        assert!(InvoiceRef::parse("").is_err());
    }

    #[test]
    fn test_ref_serde_validates() {
        let ok: InvoiceRef = serde_json::from_str("\"INV-AB12CD34\"").unwrap();
        assert_eq!(ok.as_str(), "INV-AB12CD34");
        assert!(serde_json::from_str::<InvoiceRef>("\"nope\"").is_err());
    }

    #[test]
    fn test_gateway_ref_rejects_blank() {
        assert!(GatewayRef::new("T123").is_ok());
        assert!(GatewayRef::new("  ").is_err());
    }

    #[test]
    fn test_status_transitions() {
        use InvoiceStatus::*;

        assert!(Pending.can_transition_to(AwaitingVerification));
        assert!(AwaitingVerification.can_transition_to(Paid));
        assert!(AwaitingVerification.can_transition_to(Failed));

        assert!(!Pending.can_transition_to(Paid));
        assert!(!Pending.can_transition_to(Failed));
        assert!(!Paid.can_transition_to(Pending));
        assert!(!Paid.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Paid));
        assert!(!AwaitingVerification.can_transition_to(Pending));
    }

    #[test]
    fn test_terminal_states() {
        assert!(InvoiceStatus::Paid.is_terminal());
        assert!(InvoiceStatus::Failed.is_terminal());
        assert!(!InvoiceStatus::Pending.is_terminal());
        assert!(!InvoiceStatus::AwaitingVerification.is_terminal());
    }

    #[test]
    fn test_status_string_forms() {
        for status in [
            InvoiceStatus::Pending,
            InvoiceStatus::AwaitingVerification,
            InvoiceStatus::Paid,
            InvoiceStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<InvoiceStatus>().unwrap(), status);
            assert_eq!(
                serde_json::to_string(&status).unwrap(),
                format!("\"{}\"", status.as_str())
            );
        }
        assert!("SETTLED".parse::<InvoiceStatus>().is_err());
    }

    #[test]
    fn test_new_invoice_is_pending() {
        let inv = Invoice::new(
            InvoiceRef::generate(),
            7,
            Amount::new(20_000),
            "{}",
            1_000,
        );
        assert_eq!(inv.status, InvoiceStatus::Pending);
        assert!(inv.gateway_ref.is_none());
        assert_eq!(inv.updated_at, inv.created_at);
        assert!(!inv.is_paid());
    }
}
