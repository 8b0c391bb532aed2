//! Integer money amounts in the currency's minor unit.
//!
//! Catalog prices are stored as integers (e.g. won, or cents), so totals are
//! computed with checked integer arithmetic and never touch floating point.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors from money arithmetic.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoneyError {
    /// A line or order total does not fit in an `i64`.
    #[error("amount overflow")]
    Overflow,
    /// A negative unit price was supplied.
    #[error("amount cannot be negative: {0}")]
    Negative(i64),
}

/// An amount of money in minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Zero.
    pub const ZERO: Self = Self(0);

    /// Create an amount from minor units.
    #[must_use]
    pub const fn from_minor(amount: i64) -> Self {
        Self(amount)
    }

    /// Create a unit price, rejecting negative amounts.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::Negative` if `amount < 0`.
    pub const fn unit_price(amount: i64) -> Result<Self, MoneyError> {
        if amount < 0 {
            return Err(MoneyError::Negative(amount));
        }
        Ok(Self(amount))
    }

    /// The amount in minor units.
    #[must_use]
    pub const fn minor(self) -> i64 {
        self.0
    }

    /// `self × quantity`.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::Overflow` if the product does not fit.
    pub fn times(self, quantity: i64) -> Result<Self, MoneyError> {
        self.0
            .checked_mul(quantity)
            .map(Self)
            .ok_or(MoneyError::Overflow)
    }

    /// `self + other`.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::Overflow` if the sum does not fit.
    pub fn checked_add(self, other: Self) -> Result<Self, MoneyError> {
        self.0
            .checked_add(other.0)
            .map(Self)
            .ok_or(MoneyError::Overflow)
    }

    /// Sum an iterator of amounts, failing on overflow.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::Overflow` if the running total does not fit.
    pub fn try_sum<I>(amounts: I) -> Result<Self, MoneyError>
    where
        I: IntoIterator<Item = Result<Self, MoneyError>>,
    {
        amounts
            .into_iter()
            .try_fold(Self::ZERO, |acc, amount| acc.checked_add(amount?))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
