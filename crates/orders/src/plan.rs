//! Order planning: the decision half of placing an order.
//!
//! A plan is computed from rows read **inside** the placing transaction, so
//! the prices and stock levels it sees are the ones the transaction will
//! write against.
//!
//! ## Check order
//!
//! ```text
//! 1. customer exists                 -> NotFound(customer)
//! 2. every line resolves to a book   -> NotFound(book), first failing line
//! 3. every book has enough stock     -> InsufficientStock, first failing line
//! ```
//!
//! Each phase runs over all lines before the next phase starts, so for a
//! given request and store state the reported error is always the same one.

use chrono::{DateTime, Utc};

use bookstore_catalog::Book;
use bookstore_core::{CustomerId, Money, OrderId};
use bookstore_customers::Customer;

use crate::error::OrderError;
use crate::order::{Order, OrderItem, compute_total};
use crate::request::OrderRequest;

/// A fully validated, priced order that has not been written yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderPlan {
    customer_id: CustomerId,
    items: Vec<OrderItem>,
    total: Money,
}

impl OrderPlan {
    /// Validate `request` against the customer and book rows the store returned.
    ///
    /// `books` may be in any order and may contain rows that were not
    /// requested; each line is matched by ISBN or id.
    pub fn build(
        customer: Option<&Customer>,
        request: &OrderRequest,
        books: &[Book],
    ) -> Result<Self, OrderError> {
        let customer =
            customer.ok_or_else(|| OrderError::customer_not_found(request.customer_email()))?;

        // Phase 2: resolve every line.
        let mut resolved: Vec<(&Book, i32)> = Vec::with_capacity(request.lines().len());
        for line in request.lines() {
            let book = books
                .iter()
                .find(|b| b.matches(&line.book))
                .ok_or_else(|| OrderError::book_not_found(&line.book))?;
            resolved.push((book, line.quantity));
        }

        // An ISBN line and an id line can name the same book.
        let mut merged: Vec<(&Book, i32)> = Vec::with_capacity(resolved.len());
        for (book, quantity) in resolved {
            match merged
                .iter_mut()
                .find(|(b, _)| b.id_typed() == book.id_typed())
            {
                Some(entry) => {
                    entry.1 = entry.1.checked_add(quantity).ok_or_else(|| {
                        OrderError::invalid(format!("total quantity for {} overflows", book.isbn()))
                    })?;
                }
                None => merged.push((book, quantity)),
            }
        }

        // Phase 3: stock.
        for (book, quantity) in &merged {
            if !book.can_supply(*quantity) {
                return Err(OrderError::InsufficientStock {
                    book: book.id_typed(),
                    isbn: book.isbn().clone(),
                    available: book.stock_quantity(),
                    requested: *quantity,
                });
            }
        }

        let items: Vec<OrderItem> = merged
            .into_iter()
            .map(|(book, quantity)| OrderItem {
                book_id: book.id_typed(),
                isbn: book.isbn().clone(),
                quantity,
                unit_price: book.price(),
            })
            .collect();
        let total =
            compute_total(&items).ok_or_else(|| OrderError::invalid("order total overflows"))?;

        Ok(Self {
            customer_id: customer.id,
            items,
            total,
        })
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn total(&self) -> Money {
        self.total
    }

    /// Materialize the plan as an order, re-checking the order invariants.
    pub fn into_order(self, id: OrderId, created_at: DateTime<Utc>) -> Result<Order, OrderError> {
        Ok(Order::new(id, self.customer_id, created_at, self.items)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EntityKind;
    use bookstore_catalog::{BookRef, Isbn};
    use bookstore_core::{BookId, CustomerId};
    use bookstore_customers::Email;
    use proptest::prelude::*;

    fn customer() -> Customer {
        Customer::new(
            CustomerId::new(),
            "Alice",
            "Johnson",
            Email::parse("alice@example.com").unwrap(),
        )
    }

    fn book(isbn: &str, cents: u64, stock: i32) -> Book {
        Book::new(
            BookId::new(),
            Isbn::parse(isbn).unwrap(),
            format!("Book {isbn}"),
            Money::from_cents(cents),
            stock,
        )
        .unwrap()
    }

    #[test]
    fn prices_lines_with_current_book_prices() {
        let books = vec![book("111", 1299, 10), book("222", 2499, 1)];
        let req = OrderRequest::new("alice@example.com", [("111", 2), ("222", 1)]).unwrap();

        let plan = OrderPlan::build(Some(&customer()), &req, &books).unwrap();

        assert_eq!(plan.items().len(), 2);
        assert_eq!(plan.items()[0].unit_price, Money::from_cents(1299));
        assert_eq!(plan.total(), Money::from_cents(2 * 1299 + 2499));
    }

    #[test]
    fn missing_customer_wins_over_missing_book() {
        let req = OrderRequest::new("ghost@example.com", [("999", 1)]).unwrap();
        let err = OrderPlan::build(None, &req, &[]).unwrap_err();
        assert_eq!(
            err,
            OrderError::NotFound {
                entity: EntityKind::Customer,
                identifier: "ghost@example.com".into()
            }
        );
    }

    #[test]
    fn missing_book_wins_over_insufficient_stock() {
        // First line is short on stock, second line does not exist: existence is checked first.
        let books = vec![book("111", 100, 0)];
        let req = OrderRequest::new("alice@example.com", [("111", 5), ("404", 1)]).unwrap();
        let err = OrderPlan::build(Some(&customer()), &req, &books).unwrap_err();
        assert_eq!(
            err,
            OrderError::NotFound {
                entity: EntityKind::Book,
                identifier: "404".into()
            }
        );
    }

    #[test]
    fn first_missing_book_in_request_order_is_reported() {
        let req = OrderRequest::new("alice@example.com", [("501", 1), ("502", 1)]).unwrap();
        let err = OrderPlan::build(Some(&customer()), &req, &[]).unwrap_err();
        assert_eq!(err, OrderError::book_not_found(&BookRef::parse("501").unwrap()));
    }

    #[test]
    fn first_short_book_in_request_order_is_reported() {
        let a = book("111", 100, 1);
        let b = book("222", 100, 1);
        let req = OrderRequest::new("alice@example.com", [("222", 3), ("111", 2)]).unwrap();
        let err = OrderPlan::build(Some(&customer()), &req, &[a, b.clone()]).unwrap_err();
        assert_eq!(
            err,
            OrderError::InsufficientStock {
                book: b.id_typed(),
                isbn: b.isbn().clone(),
                available: 1,
                requested: 3
            }
        );
    }

    #[test]
    fn isbn_and_id_lines_for_the_same_book_are_merged() {
        let b = book("111", 500, 4);
        let req = OrderRequest::new(
            "alice@example.com",
            [("111".to_string(), 2), (b.id_typed().to_string(), 2)],
        )
        .unwrap();
        let plan = OrderPlan::build(Some(&customer()), &req, std::slice::from_ref(&b)).unwrap();
        assert_eq!(plan.items().len(), 1);
        assert_eq!(plan.items()[0].quantity, 4);

        let req = OrderRequest::new(
            "alice@example.com",
            [("111".to_string(), 3), (b.id_typed().to_string(), 2)],
        )
        .unwrap();
        let err = OrderPlan::build(Some(&customer()), &req, &[b]).unwrap_err();
        assert!(matches!(err, OrderError::InsufficientStock { requested: 5, .. }));
    }

    #[test]
    fn exact_stock_is_enough() {
        let books = vec![book("111", 100, 3)];
        let req = OrderRequest::new("alice@example.com", [("111", 3)]).unwrap();
        assert!(OrderPlan::build(Some(&customer()), &req, &books).is_ok());
    }

    #[test]
    fn into_order_is_balanced() {
        let books = vec![book("111", 1999, 5)];
        let req = OrderRequest::new("alice@example.com", [("111", 2)]).unwrap();
        let c = customer();
        let order = OrderPlan::build(Some(&c), &req, &books)
            .unwrap()
            .into_order(OrderId::new(), Utc::now())
            .unwrap();
        assert!(order.is_balanced());
        assert_eq!(order.customer_id(), c.id);
        assert_eq!(order.total_amount(), Money::from_cents(2 * 1999));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: a successful plan's total is exactly sum(quantity * price),
        /// and applying it leaves every book at pre-stock minus merged quantity, never negative.
        #[test]
        fn conservation_and_stock_monotonicity(
            catalog in prop::collection::vec((1u64..50_000u64, 0i32..20i32), 1..6),
            picks in prop::collection::vec((0usize..6, 1i32..8i32), 1..12)
        ) {
            let mut books: Vec<Book> = catalog
                .iter()
                .enumerate()
                .map(|(i, (cents, stock))| book(&format!("978-{i}"), *cents, *stock))
                .collect();
            let items: Vec<(String, i32)> = picks
                .iter()
                .filter(|(i, _)| *i < books.len())
                .map(|(i, q)| (format!("978-{i}"), *q))
                .collect();
            prop_assume!(!items.is_empty());
            let req = OrderRequest::new("alice@example.com", items.clone()).unwrap();

            match OrderPlan::build(Some(&customer()), &req, &books) {
                Ok(plan) => {
                    let expected: Money = items
                        .iter()
                        .map(|(isbn, q)| {
                            let b = books.iter().find(|b| b.isbn().as_str() == isbn).unwrap();
                            b.price().times(*q).unwrap()
                        })
                        .sum();
                    prop_assert_eq!(plan.total(), expected);

                    let before: Vec<i32> = books.iter().map(|b| b.stock_quantity()).collect();
                    for item in plan.items() {
                        let b = books.iter_mut().find(|b| b.id_typed() == item.book_id).unwrap();
                        b.take_stock(item.quantity).unwrap();
                    }
                    for (b, pre) in books.iter().zip(before) {
                        let requested: i32 = items
                            .iter()
                            .filter(|(isbn, _)| isbn == b.isbn().as_str())
                            .map(|(_, q)| *q)
                            .sum();
                        prop_assert_eq!(b.stock_quantity(), pre - requested);
                        prop_assert!(b.stock_quantity() >= 0);
                    }
                }
                Err(OrderError::InsufficientStock { available, requested, .. }) => {
                    prop_assert!(available < requested);
                }
                Err(other) => prop_assert!(false, "unexpected error: {other:?}"),
            }
        }
    }
}
