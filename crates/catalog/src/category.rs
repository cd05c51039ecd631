use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bookstore_core::{CategoryId, DomainError, DomainResult, Entity, Money, ValueObject};

/// A catalog category (names are unique).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub description: Option<String>,
}

impl Category {
    pub fn new(id: CategoryId, name: impl Into<String>) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("category name must not be empty"));
        }
        Ok(Self {
            id,
            name,
            description: None,
        })
    }
}

impl Entity for Category {
    type Id = CategoryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Percentage taken off a price, in `(0, 100]`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct DiscountPercent(Decimal);

impl ValueObject for DiscountPercent {}

impl DiscountPercent {
    pub fn new(percent: Decimal) -> DomainResult<Self> {
        if percent <= Decimal::ZERO || percent > Decimal::ONE_HUNDRED {
            return Err(DomainError::validation(format!(
                "discount must be in (0, 100], got {percent}"
            )));
        }
        Ok(Self(percent))
    }

    pub fn percent(&self) -> Decimal {
        self.0
    }

    /// Discounted price, rounded to cents the same way the store rounds.
    pub fn apply(&self, price: Money) -> Money {
        let factor = (Decimal::ONE_HUNDRED - self.0) / Decimal::ONE_HUNDRED;
        // factor is in [0, 1), so the product stays non-negative
        Money::new(price.amount() * factor)
            .unwrap_or(Money::ZERO)
            .rounded()
    }
}

impl TryFrom<Decimal> for DiscountPercent {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        DiscountPercent::new(value)
    }
}

impl From<DiscountPercent> for Decimal {
    fn from(value: DiscountPercent) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn discount_bounds() {
        assert!(DiscountPercent::new(Decimal::ZERO).is_err());
        assert!(DiscountPercent::new(dec("100.01")).is_err());
        assert!(DiscountPercent::new(dec("-5")).is_err());
        assert!(DiscountPercent::new(Decimal::ONE_HUNDRED).is_ok());
    }

    #[test]
    fn ten_percent_off_rounds_to_cents() {
        let ten = DiscountPercent::new(dec("10")).unwrap();
        assert_eq!(ten.apply(Money::from_cents(1699)).amount(), dec("15.29"));
        assert_eq!(ten.apply(Money::from_cents(1299)).amount(), dec("11.69"));
    }

    #[test]
    fn full_discount_is_free() {
        let all = DiscountPercent::new(Decimal::ONE_HUNDRED).unwrap();
        assert_eq!(all.apply(Money::from_cents(999)), Money::ZERO);
    }
}
