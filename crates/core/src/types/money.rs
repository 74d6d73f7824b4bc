//! Decimal money amounts.
//!
//! Amounts are kept at full precision through every multiplication and sum.
//! Rounding to cents happens only when an amount leaves the system: when it is
//! displayed ([`Money::display`]) or handed to the payment processor in minor
//! units ([`Money::to_cents`]).

use core::fmt;
use core::iter::Sum;
use core::ops::{Add, AddAssign, Mul, Sub};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Errors that can occur when constructing a catalog price.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyError {
    /// Prices must not be negative.
    #[error("price must not be negative (got {0})")]
    Negative(Decimal),
    /// A minor-unit amount could not be represented.
    #[error("amount {0} does not fit in minor units")]
    Overflow(Decimal),
}

/// An amount of money in the store currency.
///
/// Arithmetic is unchecked so cart summaries can be computed with the exact
/// formula they are specified by; catalog input goes through
/// [`Money::try_new`], which rejects negative prices.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type), sqlx(transparent))]
pub struct Money(Decimal);

impl Money {
    /// Zero.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Wrap a decimal amount without validation.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Wrap a catalog price, rejecting negative values.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Negative`] if `amount < 0`.
    pub fn try_new(amount: Decimal) -> Result<Self, MoneyError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(MoneyError::Negative(amount));
        }
        Ok(Self(amount))
    }

    /// Build an amount from minor units (cents).
    #[must_use]
    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, 2))
    }

    /// The underlying decimal.
    #[must_use]
    pub const fn amount(self) -> Decimal {
        self.0
    }

    /// Whether the amount is strictly positive.
    #[must_use]
    pub fn is_positive(self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// `self - other`, clamped at zero.
    #[must_use]
    pub fn saturating_sub(self, other: Self) -> Self {
        if other.0 >= self.0 {
            Self::ZERO
        } else {
            Self(self.0 - other.0)
        }
    }

    /// Round to cents (half away from zero) and return minor units.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Overflow`] if the amount does not fit in `i64` cents.
    pub fn to_cents(self) -> Result<i64, MoneyError> {
        let cents = (self.rounded().0 * Decimal::ONE_HUNDRED).trunc();
        cents.to_i64().ok_or(MoneyError::Overflow(self.0))
    }

    /// Round to two decimal places for presentation.
    #[must_use]
    pub fn rounded(self) -> Self {
        Self(
            self.0
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
        )
    }

    /// Format for display, e.g. `$19.99`.
    #[must_use]
    pub fn display(self) -> String {
        let rounded = self.rounded().0;
        if rounded.is_sign_negative() && !rounded.is_zero() {
            format!("-${:.2}", rounded.abs())
        } else {
            format!("${:.2}", rounded.abs())
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Mul<u32> for Money {
    type Output = Self;

    fn mul(self, rhs: u32) -> Self {
        Self(self.0 * Decimal::from(rhs))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        assert_eq!(Money::from_cents(1999).amount(), Decimal::new(1999, 2));
        assert_eq!(Money::from_cents(-5).amount(), Decimal::new(-5, 2));
    }

    #[test]
    fn test_try_new_rejects_negative() {
        assert!(Money::try_new(Decimal::new(-1, 2)).is_err());
        assert!(Money::try_new(Decimal::ZERO).is_ok());
    }

    #[test]
    fn test_rounding_happens_only_at_display() {
        // 3 units at 0.333 accumulate to 0.999 before rounding, not 0.99
        let unit = Money::new(Decimal::new(333, 3));
        let line = unit * 3;
        assert_eq!(line.amount(), Decimal::new(999, 3));
        assert_eq!(line.display(), "$1.00");
        assert_eq!(line.to_cents().unwrap(), 100);
    }

    #[test]
    fn test_saturating_sub() {
        let a = Money::from_cents(500);
        let b = Money::from_cents(700);
        assert_eq!(a.saturating_sub(b), Money::ZERO);
        assert_eq!(b.saturating_sub(a), Money::from_cents(200));
    }

    #[test]
    fn test_display_negative() {
        assert_eq!(Money::from_cents(-250).display(), "-$2.50");
    }
}
