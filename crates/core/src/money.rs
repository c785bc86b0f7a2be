//! Money and percentage rates.
//!
//! Amounts are exact decimals in the marketplace's single currency. Derived
//! amounts (discounts, commissions) are rounded to [`Money::SCALE`] places,
//! midpoint away from zero.

use core::iter::Sum;
use core::ops::Add;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Non-negative monetary amount.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Decimal places kept for derived amounts.
    pub const SCALE: u32 = 2;

    /// Validate and wrap an amount (rejects negatives).
    pub fn new(amount: Decimal) -> DomainResult<Self> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(DomainError::validation(format!(
                "amount must not be negative (got {amount})"
            )));
        }
        Ok(Self(amount))
    }

    /// Validate a strictly positive amount.
    pub fn positive(amount: Decimal, what: &str) -> DomainResult<Self> {
        if amount <= Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "{what} must be greater than zero (got {amount})"
            )));
        }
        Ok(Self(amount))
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// `self - other`, floored at zero.
    pub fn saturating_sub(self, other: Money) -> Money {
        if other.0 >= self.0 {
            Money::ZERO
        } else {
            Money(self.0 - other.0)
        }
    }

    /// `self - other`, or `None` if the result would be negative.
    pub fn checked_sub(self, other: Money) -> Option<Money> {
        (self.0 >= other.0).then(|| Money(self.0 - other.0))
    }

    /// Multiply by a non-negative scalar (quantity, weight).
    pub fn times(self, factor: Decimal) -> Money {
        Money(self.0 * factor)
    }

    /// `self × rate / 100`, rounded to [`Money::SCALE`].
    pub fn percent(self, rate: Rate) -> Money {
        Money(round(self.0 * rate.0 / Decimal::ONE_HUNDRED))
    }

    pub fn min(self, other: Money) -> Money {
        if other.0 < self.0 { other } else { self }
    }
}

impl TryFrom<Decimal> for Money {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Money::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

fn round(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(Money::SCALE, RoundingStrategy::MidpointAwayFromZero)
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Money {
        iter.copied().sum()
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Percentage in `[0, 100]` (e.g. `10` means 10%).
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Rate(Decimal);

impl Rate {
    pub const ZERO: Rate = Rate(Decimal::ZERO);

    pub fn new(percent: Decimal) -> DomainResult<Self> {
        if percent < Decimal::ZERO || percent > Decimal::ONE_HUNDRED {
            return Err(DomainError::validation(format!(
                "percentage must be between 0 and 100 (got {percent})"
            )));
        }
        Ok(Self(percent))
    }

    pub fn percent(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Rate {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Rate::new(value)
    }
}

impl From<Rate> for Decimal {
    fn from(value: Rate) -> Self {
        value.0
    }
}

impl core::fmt::Display for Rate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn negative_amounts_are_rejected() {
        assert!(Money::new(dec!(-0.01)).is_err());
        assert!(Money::new(dec!(0)).is_ok());
        assert!(Money::positive(dec!(0), "amount").is_err());
    }

    #[test]
    fn percent_rounds_half_away_from_zero() {
        let m = Money::new(dec!(10.05)).unwrap();
        let r = Rate::new(dec!(50)).unwrap();
        // 5.025 -> 5.03
        assert_eq!(m.percent(r).amount(), dec!(5.03));
    }

    #[test]
    fn saturating_sub_floors_at_zero() {
        let a = Money::new(dec!(150000)).unwrap();
        let b = Money::new(dec!(200000)).unwrap();
        assert_eq!(a.saturating_sub(b), Money::ZERO);
        assert_eq!(a.checked_sub(b), None);
        assert_eq!(b.checked_sub(a), Some(Money::new(dec!(50000)).unwrap()));
    }

    #[test]
    fn deserialization_validates_amounts() {
        assert!(serde_json::from_str::<Money>("\"-5\"").is_err());
        let m: Money = serde_json::from_str("\"1000000\"").unwrap();
        assert_eq!(m.amount(), dec!(1000000));
    }

    #[test]
    fn rate_must_be_a_percentage() {
        assert!(Rate::new(dec!(100.01)).is_err());
        assert!(Rate::new(dec!(-1)).is_err());
        assert_eq!(Rate::new(dec!(12.5)).unwrap().to_string(), "12.5%");
    }
}
