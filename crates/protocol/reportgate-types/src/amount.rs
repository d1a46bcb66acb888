//! Currency amounts.
//!
//! Invoices are priced in whole major units (naira, dollars). Payment
//! providers speak minor units (kobo, cents) on the wire. [`Amount`] is the
//! only place the two meet: providers call [`Amount::to_minor_units`] once per
//! request and verification results are compared with
//! [`Amount::matches_minor_units`].

use serde::{Deserialize, Serialize};

use crate::constants::MINOR_UNITS_PER_MAJOR;
use crate::error::{Result, TypesError};

/// An amount in whole major currency units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    /// Create an amount from major units.
    pub const fn new(major_units: u64) -> Self {
        Self(major_units)
    }

    /// Major units.
    pub const fn major_units(&self) -> u64 {
        self.0
    }

    /// Convert to provider minor units (x100).
    pub fn to_minor_units(&self) -> Result<u64> {
        self.0
            .checked_mul(MINOR_UNITS_PER_MAJOR)
            .ok_or(TypesError::AmountOverflow(self.0))
    }

    /// Build an amount from minor units.
    ///
    /// Fails when the value carries a fractional major unit, since invoices
    /// are never priced below one major unit.
    pub fn from_minor_units(minor_units: u64) -> Result<Self> {
        if minor_units % MINOR_UNITS_PER_MAJOR != 0 {
            return Err(TypesError::FractionalAmount(minor_units));
        }
        Ok(Self(minor_units / MINOR_UNITS_PER_MAJOR))
    }

    /// True when `minor_units` is exactly this amount.
    pub fn matches_minor_units(&self, minor_units: u64) -> bool {
        self.to_minor_units().map(|m| m == minor_units).unwrap_or(false)
    }

    /// Render minor units as a two-decimal major-unit string ("20000.00").
    pub fn to_decimal_string(&self) -> Result<String> {
        let minor = self.to_minor_units()?;
        Ok(format!(
            "{}.{:02}",
            minor / MINOR_UNITS_PER_MAJOR,
            minor % MINOR_UNITS_PER_MAJOR
        ))
    }
}

impl From<u64> for Amount {
    fn from(major_units: u64) -> Self {
        Self(major_units)
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
