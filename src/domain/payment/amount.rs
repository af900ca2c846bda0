//! Monetary amounts in minor currency units.
//!
//! All stored amounts are integer counts of the smallest currency subunit
//! (tiyin for UZS, cents for USD). Floating point only appears at the
//! provider boundary, where gateways report amounts in major units
//! (e.g. `"1000.00"` sums), and is converted immediately.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::ValidationError;

/// Number of minor units in one major unit (tiyin per sum, cents per dollar).
const MINOR_PER_MAJOR: f64 = 100.0;

/// Permitted difference between a stored amount and a provider-claimed
/// amount, in minor units. Absorbs rounding of the provider's decimal
/// representation.
pub const AMOUNT_TOLERANCE: i64 = 1;

/// An amount of money in minor currency units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MinorUnits(i64);

impl MinorUnits {
    /// Creates an amount from a minor-unit count.
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Converts a major-unit amount (as reported by a gateway) into minor
    /// units, rounding to the nearest unit.
    pub fn from_major(major: f64) -> Self {
        Self((major * MINOR_PER_MAJOR).round() as i64)
    }

    /// Parses a major-unit decimal string (e.g. `"1000.00"`).
    pub fn from_major_str(s: &str) -> Result<Self, ValidationError> {
        let major: f64 = s
            .trim()
            .parse()
            .map_err(|_| ValidationError::invalid_format("amount", "not a decimal number"))?;
        if !major.is_finite() || major < 0.0 {
            return Err(ValidationError::invalid_format(
                "amount",
                "must be a non-negative finite number",
            ));
        }
        Ok(Self::from_major(major))
    }

    /// Returns the raw minor-unit count.
    pub const fn value(&self) -> i64 {
        self.0
    }

    /// Renders the amount in major units with two decimals, the format
    /// gateways use in signing strings and redirect URLs.
    pub fn to_major_string(&self) -> String {
        format!("{:.2}", self.0 as f64 / MINOR_PER_MAJOR)
    }

    /// Checks whether another amount matches this one within the rounding
    /// tolerance of [`AMOUNT_TOLERANCE`].
    pub fn matches(&self, claimed: MinorUnits) -> bool {
        (self.0 - claimed.0).abs() <= AMOUNT_TOLERANCE
    }
}

impl fmt::Display for MinorUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
