//! Monetary amounts.
//!
//! Prices and order totals are exact decimals (`rust_decimal::Decimal`), never
//! floats, so `quantity * unit_price` summed over an order equals the stored
//! total with no drift. Amounts are non-negative; there is no currency field
//! because the bookstore prices everything in one currency.

use core::iter::Sum;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// Number of fractional digits the store keeps for monetary columns (`NUMERIC(10,2)`).
pub const MONEY_SCALE: u32 = 2;

/// A non-negative monetary amount.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl ValueObject for Money {}

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Create an amount, rejecting negative values.
    pub fn new(amount: Decimal) -> DomainResult<Self> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(DomainError::validation(format!(
                "amount must be non-negative, got {amount}"
            )));
        }
        Ok(Self(amount))
    }

    /// Convenience constructor from an integer number of cents.
    pub fn from_cents(cents: u64) -> Self {
        Self(Decimal::from(cents) / Decimal::ONE_HUNDRED)
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// `self * quantity`. Returns `None` on overflow or a negative quantity.
    pub fn times(&self, quantity: i32) -> Option<Money> {
        if quantity < 0 {
            return None;
        }
        self.0.checked_mul(Decimal::from(quantity)).map(Money)
    }

    pub fn checked_add(&self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Round to the store's scale, half away from zero (same as Postgres `ROUND(x, 2)`).
    pub fn rounded(&self) -> Money {
        Money(
            self.0
                .round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero),
        )
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

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        Money(iter.map(|m| m.0).sum())
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn rejects_negative_amounts() {
        let err = Money::new(dec("-0.01")).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn accepts_zero() {
        assert_eq!(Money::new(Decimal::ZERO).unwrap(), Money::ZERO);
    }

    #[test]
    fn times_is_exact() {
        let price = Money::new(dec("12.99")).unwrap();
        assert_eq!(price.times(3).unwrap().amount(), dec("38.97"));
        assert_eq!(price.times(-1), None);
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert_eq!(Money::new(dec("10.125")).unwrap().rounded().amount(), dec("10.13"));
        assert_eq!(Money::new(dec("10.135")).unwrap().rounded().amount(), dec("10.14"));
    }

    #[test]
    fn display_uses_two_decimals() {
        assert_eq!(Money::from_cents(1500).to_string(), "15.00");
    }

    #[test]
    fn serde_rejects_negative() {
        let parsed: Result<Money, _> = serde_json::from_str("\"-3.50\"");
        assert!(parsed.is_err());
        let ok: Money = serde_json::from_str("\"3.50\"").unwrap();
        assert_eq!(ok, Money::from_cents(350));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: summing line totals is the same as summing cents and converting once.
        #[test]
        fn sum_of_line_totals_has_no_drift(
            lines in prop::collection::vec((0u64..100_000u64, 1i32..50i32), 1..20)
        ) {
            let total: Money = lines
                .iter()
                .map(|(cents, qty)| Money::from_cents(*cents).times(*qty).unwrap())
                .sum();
            let expected_cents: u64 = lines.iter().map(|(c, q)| c * (*q as u64)).sum();
            prop_assert_eq!(total, Money::from_cents(expected_cents));
        }
    }
}
