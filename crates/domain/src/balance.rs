//! Point balances.
//!
//! Balances are stored as exact decimals so no precision is lost between the
//! store and the wire. They are never negative: the only way to change one is
//! [`Balance::checked_add`], which refuses any delta that would go below zero.

use std::fmt;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A non-negative point balance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Balance(Decimal);

impl Balance {
    pub const ZERO: Balance = Balance(Decimal::ZERO);

    /// Wrap a decimal, rejecting negative values.
    pub fn new(value: Decimal) -> Result<Self, Error> {
        if value < Decimal::ZERO {
            return Err(Error::InsufficientBalance {
                balance: 0,
                amount: value.trunc().to_i64().unwrap_or(i64::MIN),
            });
        }
        Ok(Self(value.normalize()))
    }

    /// A whole number of points. Negative input clamps to zero.
    pub fn from_points(points: i64) -> Self {
        Self(Decimal::from(points.max(0)))
    }

    /// Whole points, truncated toward zero. Saturates at `i64::MAX`.
    pub fn points(&self) -> i64 {
        self.0.trunc().to_i64().unwrap_or(i64::MAX)
    }

    /// Apply a signed point delta.
    pub fn checked_add(self, delta: i64) -> Result<Balance, BalanceError> {
        let next = self
            .0
            .checked_add(Decimal::from(delta))
            .ok_or(BalanceError::Overflow)?;
        if next < Decimal::ZERO {
            return Err(BalanceError::Insufficient);
        }
        Ok(Self(next))
    }
}

/// Why [`Balance::checked_add`] refused a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceError {
    /// The result would be negative.
    Insufficient,
    /// The result does not fit the decimal range.
    Overflow,
}

impl TryFrom<Decimal> for Balance {
    type Error = Error;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Balance::new(value)
    }
}

impl From<Balance> for Decimal {
    fn from(value: Balance) -> Self {
        value.0
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn credit_adds_exactly() {
        let b = Balance::ZERO.checked_add(1).unwrap();
        assert_eq!(b.points(), 1);
        let b = b.checked_add(41).unwrap();
        assert_eq!(b.points(), 42);
    }

    #[test]
    fn debit_below_zero_is_refused() {
        let b = Balance::from_points(3);
        assert_eq!(b.checked_add(-4), Err(BalanceError::Insufficient));
        assert_eq!(b.checked_add(-3), Ok(Balance::ZERO));
    }

    #[test]
    fn overflow_is_not_reported_as_insufficient() {
        let max = Balance::new(Decimal::MAX).unwrap();
        assert_eq!(max.checked_add(1), Err(BalanceError::Overflow));
        assert_eq!(max.checked_add(-1).unwrap().points(), i64::MAX);
    }

    #[test]
    fn points_truncate_fractional_part() {
        let b = Balance::new(Decimal::from_str("3.99").unwrap()).unwrap();
        assert_eq!(b.points(), 3);
    }

    #[test]
    fn negative_decimal_rejected() {
        assert!(Balance::new(Decimal::from_str("-0.5").unwrap()).is_err());
    }

    #[test]
    fn deserialize_rejects_negative() {
        let ok: Balance = serde_json::from_str("\"12\"").unwrap();
        assert_eq!(ok.points(), 12);
        assert!(serde_json::from_str::<Balance>("\"-1\"").is_err());
    }
}
