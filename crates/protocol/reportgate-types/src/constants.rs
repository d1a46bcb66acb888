//! Constants shared across reportgate crates.

use std::time::Duration;

// =============================================================================
// Currency
// =============================================================================

/// Provider minor units per major unit (kobo per naira, cents per dollar).
pub const MINOR_UNITS_PER_MAJOR: u64 = 100;

// =============================================================================
// Identifiers
// =============================================================================

/// Prefix of every invoice reference.
pub const INVOICE_REF_PREFIX: &str = "INV-";

/// Number of random characters after the invoice prefix.
pub const INVOICE_REF_SUFFIX_LEN: usize = 8;

/// Alphabet used for invoice and report identifiers.
pub const REF_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Prefix of every report identifier.
pub const REPORT_ID_PREFIX: &str = "RPT-";

/// Number of random characters after the report prefix.
pub const REPORT_ID_SUFFIX_LEN: usize = 12;

// =============================================================================
// Retention
// =============================================================================

/// Days a granted report stays accessible.
pub const REPORT_RETENTION_DAYS: u64 = 30;

/// Milliseconds in one day.
pub const MILLIS_PER_DAY: u64 = 24 * 60 * 60 * 1000;

// =============================================================================
// Timeouts
// =============================================================================

/// Upper bound for a single payment provider call.
pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound for a single store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Bearer tokens are refreshed this long before their stated expiry.
pub const DEFAULT_TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Token lifetime assumed when a provider omits `expires_in`.
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

// =============================================================================
// Cache
// =============================================================================

/// Default lifetime of cached lookup data (6 hours).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(6 * 60 * 60);

/// Cache keys longer than this are hashed.
pub const MAX_CACHE_KEY_LEN: usize = 200;

/// Cache key of the full dataset snapshot.
pub const DATASET_SNAPSHOT_KEY: &str = "dataset:v1";

/// Prefix of distinct-value cache keys.
pub const DISTINCT_KEY_PREFIX: &str = "distinct";
