//! Monetary amounts.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};

/// Money amount in the smallest unit of the business currency.
///
/// The currency has no sub-unit in practice, so `25000` is twenty-five
/// thousand. Integer arithmetic keeps every total exact.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Largest amount accepted from a request or produced by an order.
    pub const MAX: Money = Money(1_000_000_000_000_000);

    /// Creates a money amount from minor units.
    pub const fn new(amount: i64) -> Self {
        Self(amount)
    }

    /// Returns zero money.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Returns the amount in minor units.
    pub const fn amount(&self) -> i64 {
        self.0
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Returns true if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies by a quantity, saturating at the bounds of `i64`.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money(self.0.saturating_mul(i64::from(quantity)))
    }

    /// Returns `percent` percent of this amount, rounded down.
    pub fn percent(&self, percent: i64) -> Money {
        Money(self.0.saturating_mul(percent) / 100)
    }

    /// Rejects amounts outside `0..=Money::MAX`, naming `field`.
    pub fn within_limit(self, field: &'static str) -> Result<Money> {
        if self.is_negative() {
            return Err(DomainError::validation(field, format!("{field} cannot be negative")));
        }
        if self > Money::MAX {
            return Err(DomainError::validation(
                field,
                format!("{field} exceeds the maximum amount of {}", Money::MAX),
            ));
        }
        Ok(self)
    }

    /// Clamps negative amounts to zero.
    pub fn non_negative(self) -> Money {
        Money(self.0.max(0))
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Money {
    fn from(amount: i64) -> Self {
        Self(amount)
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0.saturating_sub(rhs.0))
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}
