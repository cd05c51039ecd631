use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bookstore_catalog::Isbn;
use bookstore_core::{BookId, CustomerId, DomainError, DomainResult, Entity, Money, OrderId};

/// Order line: book, quantity, and the unit price captured when the order was placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub book_id: BookId,
    pub isbn: Isbn,
    pub quantity: i32,
    pub unit_price: Money,
}

impl OrderItem {
    /// `quantity * unit_price`, or `None` if the product does not fit a decimal.
    pub fn line_total(&self) -> Option<Money> {
        self.unit_price.times(self.quantity)
    }
}

/// A placed order.
///
/// Orders only exist once committed; there is no draft state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    customer_id: CustomerId,
    total_amount: Money,
    created_at: DateTime<Utc>,
    items: Vec<OrderItem>,
}

impl Order {
    /// Assemble an order and compute its total from the items.
    pub fn new(
        id: OrderId,
        customer_id: CustomerId,
        created_at: DateTime<Utc>,
        items: Vec<OrderItem>,
    ) -> DomainResult<Self> {
        if items.is_empty() {
            return Err(DomainError::invariant("an order must have at least one item"));
        }
        if let Some(bad) = items.iter().find(|i| i.quantity <= 0) {
            return Err(DomainError::invariant(format!(
                "order item for {} has non-positive quantity {}",
                bad.isbn, bad.quantity
            )));
        }
        let total_amount = compute_total(&items)
            .ok_or_else(|| DomainError::validation("order total overflows"))?;
        Ok(Self {
            id,
            customer_id,
            total_amount,
            created_at,
            items,
        })
    }

    /// Rebuild an order read back from storage, trusting the stored total.
    pub fn from_parts(
        id: OrderId,
        customer_id: CustomerId,
        total_amount: Money,
        created_at: DateTime<Utc>,
        items: Vec<OrderItem>,
    ) -> Self {
        Self {
            id,
            customer_id,
            total_amount,
            created_at,
            items,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    /// True when the stored total equals the sum of the line totals.
    pub fn is_balanced(&self) -> bool {
        compute_total(&self.items) == Some(self.total_amount)
    }
}

impl Entity for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

pub(crate) fn compute_total(items: &[OrderItem]) -> Option<Money> {
    items
        .iter()
        .try_fold(Money::ZERO, |acc, item| acc.checked_add(item.line_total()?))
}

/// Terminal state of one order-placement transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderOutcome {
    /// All effects applied.
    Committed,
    /// No effects applied.
    Aborted,
}

impl OrderOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderOutcome::Committed => "committed",
            OrderOutcome::Aborted => "aborted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(isbn: &str, quantity: i32, cents: u64) -> OrderItem {
        OrderItem {
            book_id: BookId::new(),
            isbn: Isbn::parse(isbn).unwrap(),
            quantity,
            unit_price: Money::from_cents(cents),
        }
    }

    #[test]
    fn total_is_sum_of_line_totals() {
        let order = Order::new(
            OrderId::new(),
            CustomerId::new(),
            Utc::now(),
            vec![item("1", 2, 1299), item("2", 1, 2499)],
        )
        .unwrap();
        assert_eq!(order.total_amount(), Money::from_cents(2 * 1299 + 2499));
        assert!(order.is_balanced());
    }

    #[test]
    fn empty_orders_are_rejected() {
        let err = Order::new(OrderId::new(), CustomerId::new(), Utc::now(), vec![]).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn zero_quantity_items_are_rejected() {
        assert!(Order::new(OrderId::new(), CustomerId::new(), Utc::now(), vec![item("1", 0, 100)]).is_err());
    }

    #[test]
    fn tampered_total_is_unbalanced() {
        let order = Order::from_parts(
            OrderId::new(),
            CustomerId::new(),
            Money::from_cents(1),
            Utc::now(),
            vec![item("1", 1, 100)],
        );
        assert!(!order.is_balanced());
    }
}
