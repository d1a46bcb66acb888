//! Report entitlements.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{MILLIS_PER_DAY, REPORT_ID_PREFIX, REPORT_ID_SUFFIX_LEN};
use crate::invoice::{random_suffix, InvoiceRef};
use crate::{Timestamp, UserId};

/// Identifier of a granted report.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportId(String);

impl ReportId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(format!(
            "{}{}",
            REPORT_ID_PREFIX,
            random_suffix(REPORT_ID_SUFFIX_LEN)
        ))
    }

    /// Wrap an identifier read back from storage.
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Permission to retrieve the report paid for by one invoice.
///
/// Reports are never deleted; they stop being accessible at `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserReport {
    /// Report identifier
    pub report_id: ReportId,
    /// Owner
    pub user_id: UserId,
    /// The PAID invoice this report was granted for (1:1)
    pub invoice_ref: InvoiceRef,
    /// Optional display name chosen by the user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_name: Option<String>,
    /// Grant time
    pub created_at: Timestamp,
    /// End of the access window
    pub expires_at: Timestamp,
}

impl UserReport {
    /// Create a report granted at `created_at`, open for `retention_days`.
    pub fn new(
        user_id: UserId,
        invoice_ref: InvoiceRef,
        report_name: Option<String>,
        created_at: Timestamp,
        retention_days: u64,
    ) -> Self {
        let window = retention_days.saturating_mul(MILLIS_PER_DAY);
        Self {
            report_id: ReportId::generate(),
            user_id,
            invoice_ref,
            report_name,
            created_at,
            expires_at: created_at.saturating_add(window),
        }
    }

    /// True while `now` is before the expiry.
    pub fn is_accessible_at(&self, now: Timestamp) -> bool {
        now < self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::REPORT_RETENTION_DAYS;

    #[test]
    fn test_expiry_window() {
        let report = UserReport::new(
            7,
            InvoiceRef::generate(),
            None,
            1_000,
            REPORT_RETENTION_DAYS,
        );
        assert_eq!(report.expires_at, 1_000 + 30 * 86_400_000);
    }

    #[test]
    fn test_accessible_boundary() {
        let report = UserReport::new(7, InvoiceRef::generate(), None, 0, 1);
        assert!(report.is_accessible_at(0));
        assert!(report.is_accessible_at(MILLIS_PER_DAY - 1));
        assert!(!report.is_accessible_at(MILLIS_PER_DAY));
    }

    #[test]
    fn test_report_ids_are_distinct() {
        let a = ReportId::generate();
        let b = ReportId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("RPT-"));
    }
}
