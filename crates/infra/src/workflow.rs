//! Transactional order placement.
//!
//! ```text
//! OrderRequest (validated, duplicates merged)
//!   ↓
//! 1. begin transaction
//!   ↓
//! 2. find customer by email (row locked FOR KEY SHARE)
//!   ↓
//! 3. lock requested books (one statement, id order)
//!   ↓
//! 4. OrderPlan::build: customer → books exist → stock suffices → price lines
//!   ↓
//! 5. insert order, then per line: insert item, guarded stock decrement
//!   ↓
//! 6. commit
//! ```
//!
//! Any failure from step 2 onwards rolls the transaction back before the
//! error is returned, so a failed call leaves no trace in the store.

use chrono::{SubsecRound, Utc};
use tracing::{Span, debug, field, instrument};

use bookstore_core::OrderId;
use bookstore_orders::{Order, OrderError, OrderOutcome, OrderPlan, OrderRequest};

use crate::store::{DataStore, StoreTransaction};

/// Places orders against a [`DataStore`].
///
/// Cheap to clone when the store is (both bundled stores are). Concurrent
/// calls are safe; each call runs in its own transaction.
#[derive(Debug, Clone)]
pub struct OrderWorkflow<S> {
    store: S,
}

impl<S> OrderWorkflow<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_inner(self) -> S {
        self.store
    }
}

impl<S> OrderWorkflow<S>
where
    S: DataStore,
{
    /// Place an order for `customer_email` and return the new order's id.
    ///
    /// `items` are `(isbn-or-book-id, quantity)` pairs; an identifier that
    /// parses as a UUID is a book id.
    pub async fn create_order<I, T>(&self, customer_email: &str, items: I) -> Result<OrderId, OrderError>
    where
        I: IntoIterator<Item = (T, i32)>,
        T: AsRef<str>,
    {
        let request = OrderRequest::new(customer_email, items)?;
        self.place_order(&request).await.map(|order| order.id_typed())
    }

    /// Place an already-validated order and return it as committed.
    #[instrument(
        skip_all,
        fields(
            operation = "place_order",
            customer = %request.customer_email(),
            lines = request.lines().len(),
            outcome = field::Empty,
            order_id = field::Empty
        )
    )]
    pub async fn place_order(&self, request: &OrderRequest) -> Result<Order, OrderError> {
        let result = self.execute(request).await;

        let span = Span::current();
        let outcome = if result.is_ok() {
            OrderOutcome::Committed
        } else {
            OrderOutcome::Aborted
        };
        span.record("outcome", outcome.as_str());
        match &result {
            Ok(order) => {
                span.record("order_id", field::display(order.id_typed()));
                debug!(total = %order.total_amount(), "order committed");
            }
            Err(err) => debug!(reason = %err, "order aborted"),
        }
        result
    }

    async fn execute(&self, request: &OrderRequest) -> Result<Order, OrderError> {
        let mut tx = self.store.begin().await?;
        match write_order(&mut tx, request).await {
            Ok(order) => {
                tx.commit().await?;
                Ok(order)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    // The connection drops the transaction anyway; report the original failure.
                    debug!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

async fn write_order<T>(tx: &mut T, request: &OrderRequest) -> Result<Order, OrderError>
where
    T: StoreTransaction,
{
    let customer = tx.find_customer_by_email(request.customer_email()).await?;
    let books = match customer {
        Some(_) => tx.lock_books(&request.book_refs()).await?,
        None => Vec::new(),
    };

    let plan = OrderPlan::build(customer.as_ref(), request, &books)?;
    // Postgres keeps microseconds; truncate so the returned order equals the stored one.
    let order = plan.into_order(OrderId::new(), Utc::now().trunc_subsecs(6))?;

    tx.insert_order(&order).await?;
    for (idx, item) in order.items().iter().enumerate() {
        let line_no = i32::try_from(idx + 1)
            .map_err(|_| OrderError::invalid("order has too many lines"))?;
        tx.insert_order_item(order.id_typed(), line_no, item).await?;
        if tx.decrement_stock(item.book_id, item.quantity).await?.is_none() {
            return Err(OrderError::Conflict(format!(
                "stock for book {} changed while the order was being placed",
                item.isbn
            )));
        }
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::store::{FaultPoint, InMemoryStore, StoreError};
    use bookstore_catalog::{BookRef, Isbn};
    use bookstore_core::Money;
    use bookstore_orders::EntityKind;
    use proptest::prelude::*;

    fn workflow() -> OrderWorkflow<InMemoryStore> {
        OrderWorkflow::new(fixtures::sample_store().unwrap())
    }

    async fn stock(wf: &OrderWorkflow<InMemoryStore>, isbn: &str) -> i32 {
        let state = wf.store().snapshot().await;
        state
            .find_book(&BookRef::Isbn(Isbn::parse(isbn).unwrap()))
            .unwrap()
            .stock_quantity()
    }

    #[tokio::test]
    async fn successful_order_writes_everything() {
        let wf = workflow();
        let before = wf.store().snapshot().await;

        let id = wf
            .create_order(
                fixtures::ALICE,
                [(fixtures::NINETEEN_EIGHTY_FOUR, 2), (fixtures::PHILOSOPHERS_STONE, 1)],
            )
            .await
            .unwrap();

        let after = wf.store().snapshot().await;
        let order = after.order(id).unwrap();
        assert_eq!(order.items().len(), 2);
        assert_eq!(order.total_amount(), Money::from_cents(2 * 1299 + 1999));
        assert!(order.is_balanced());
        assert_eq!(after.order_count(), before.order_count() + 1);
        assert_eq!(stock(&wf, fixtures::NINETEEN_EIGHTY_FOUR).await, 50 - 2);
        assert_eq!(stock(&wf, fixtures::PHILOSOPHERS_STONE).await, 100 - 1);
    }

    #[tokio::test]
    async fn place_order_returns_the_stored_order() {
        let wf = workflow();
        let req = OrderRequest::new(fixtures::BOB, [(fixtures::MURDER_ON_THE_ORIENT_EXPRESS, 1)]).unwrap();
        let order = wf.place_order(&req).await.unwrap();
        assert_eq!(wf.store().snapshot().await.order(order.id_typed()), Some(order));
    }

    #[tokio::test]
    async fn duplicates_are_merged_into_one_line() {
        let wf = workflow();
        let id = wf
            .create_order(
                fixtures::ALICE,
                [(fixtures::NINETEEN_EIGHTY_FOUR, 2), (fixtures::NINETEEN_EIGHTY_FOUR, 3)],
            )
            .await
            .unwrap();
        let order = wf.store().snapshot().await.order(id).unwrap();
        assert_eq!(order.items().len(), 1);
        assert_eq!(order.items()[0].quantity, 5);
        assert_eq!(stock(&wf, fixtures::NINETEEN_EIGHTY_FOUR).await, 45);
    }

    #[tokio::test]
    async fn isbn_and_id_naming_the_same_book_share_one_line() {
        let wf = workflow();
        let state = wf.store().snapshot().await;
        let book_id = state
            .find_book(&BookRef::Isbn(Isbn::parse(fixtures::NINETEEN_EIGHTY_FOUR).unwrap()))
            .unwrap()
            .id_typed();

        let id = wf
            .create_order(
                fixtures::ALICE,
                [(fixtures::NINETEEN_EIGHTY_FOUR.to_string(), 1), (book_id.to_string(), 4)],
            )
            .await
            .unwrap();
        let order = wf.store().snapshot().await.order(id).unwrap();
        assert_eq!(order.items().len(), 1);
        assert_eq!(order.items()[0].quantity, 5);
    }

    #[tokio::test]
    async fn unknown_customer_changes_nothing() {
        let wf = workflow();
        let before = wf.store().snapshot().await;
        let err = wf
            .create_order("nobody@example.com", [(fixtures::NINETEEN_EIGHTY_FOUR, 1)])
            .await
            .unwrap_err();
        assert_eq!(
            err,
            OrderError::NotFound {
                entity: EntityKind::Customer,
                identifier: "nobody@example.com".into()
            }
        );
        assert_eq!(wf.store().snapshot().await, before);
    }

    #[tokio::test]
    async fn unknown_book_changes_nothing() {
        let wf = workflow();
        let before = wf.store().snapshot().await;
        let err = wf
            .create_order(fixtures::ALICE, [(fixtures::NINETEEN_EIGHTY_FOUR, 1), ("978-0000000000", 1)])
            .await
            .unwrap_err();
        assert_eq!(
            err,
            OrderError::NotFound {
                entity: EntityKind::Book,
                identifier: "978-0000000000".into()
            }
        );
        assert_eq!(wf.store().snapshot().await, before);
    }

    #[tokio::test]
    async fn unknown_customer_wins_over_unrecognisable_book() {
        let wf = workflow();
        let err = wf
            .create_order("nobody@example.com", [("ISBN 0-00", 1)])
            .await
            .unwrap_err();
        assert_eq!(
            err,
            OrderError::NotFound {
                entity: EntityKind::Customer,
                identifier: "nobody@example.com".into()
            }
        );

        let long_email = format!("{}@example.com", "x".repeat(200));
        let err = wf
            .create_order(&long_email, [(fixtures::NINETEEN_EIGHTY_FOUR, 1)])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::NotFound { entity: EntityKind::Customer, .. }
        ));
    }

    #[tokio::test]
    async fn any_unmatched_identifier_is_a_missing_book() {
        let wf = workflow();
        let before = wf.store().snapshot().await;
        let long_isbn = "9".repeat(25);
        for raw in ["no-such-book", "ISBN 0-00", long_isbn.as_str()] {
            let err = wf.create_order(fixtures::ALICE, [(raw, 1)]).await.unwrap_err();
            assert_eq!(
                err,
                OrderError::NotFound {
                    entity: EntityKind::Book,
                    identifier: raw.into()
                }
            );
        }
        assert_eq!(wf.store().snapshot().await, before);
    }

    #[tokio::test]
    async fn insufficient_stock_reports_levels_and_changes_nothing() {
        let wf = workflow();
        let before = wf.store().snapshot().await;
        let err = wf
            .create_order(fixtures::ALICE, [(fixtures::NINETEEN_EIGHTY_FOUR, 1), (fixtures::THE_HOBBIT, 4)])
            .await
            .unwrap_err();
        match err {
            OrderError::InsufficientStock { isbn, available, requested, .. } => {
                assert_eq!(isbn.as_str(), fixtures::THE_HOBBIT);
                assert_eq!(available, 3);
                assert_eq!(requested, 4);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(wf.store().snapshot().await, before);
    }

    #[tokio::test]
    async fn exact_remaining_stock_can_be_ordered() {
        let wf = workflow();
        wf.create_order(fixtures::ALICE, [(fixtures::THE_HOBBIT, 3)]).await.unwrap();
        assert_eq!(stock(&wf, fixtures::THE_HOBBIT).await, 0);

        let err = wf
            .create_order(fixtures::BOB, [(fixtures::THE_HOBBIT, 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::InsufficientStock { available: 0, requested: 1, .. }));
    }

    #[tokio::test]
    async fn invalid_requests_never_reach_the_store() {
        let wf = workflow();
        // A Begin fault would surface if the store were touched.
        wf.store().inject_fault(FaultPoint::Begin, StoreError::Unavailable("down".into()));

        let empty: [(&str, i32); 0] = [];
        assert!(matches!(
            wf.create_order(fixtures::ALICE, empty).await,
            Err(OrderError::InvalidRequest(_))
        ));
        assert!(matches!(
            wf.create_order(fixtures::ALICE, [(fixtures::THE_HOBBIT, 0)]).await,
            Err(OrderError::InvalidRequest(_))
        ));
        assert!(matches!(
            wf.create_order("", [(fixtures::THE_HOBBIT, 1)]).await,
            Err(OrderError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn failure_at_any_write_step_rolls_everything_back() {
        for point in [
            FaultPoint::Begin,
            FaultPoint::FindCustomer,
            FaultPoint::LockBooks,
            FaultPoint::InsertOrder,
            FaultPoint::InsertOrderItem,
            FaultPoint::DecrementStock,
            FaultPoint::Commit,
        ] {
            let wf = workflow();
            let before = wf.store().snapshot().await;
            wf.store()
                .inject_fault(point, StoreError::Unavailable(format!("{point:?} failed")));

            let err = wf
                .create_order(
                    fixtures::ALICE,
                    [(fixtures::NINETEEN_EIGHTY_FOUR, 1), (fixtures::PHILOSOPHERS_STONE, 2)],
                )
                .await
                .unwrap_err();

            assert_eq!(err, OrderError::StoreUnavailable(format!("{point:?} failed")));
            assert_eq!(wf.store().snapshot().await, before, "state changed after {point:?} fault");
        }
    }

    #[tokio::test]
    async fn store_conflicts_surface_as_retryable() {
        let wf = workflow();
        wf.store()
            .inject_fault(FaultPoint::LockBooks, StoreError::Conflict("deadlock detected".into()));
        let err = wf
            .create_order(fixtures::ALICE, [(fixtures::NINETEEN_EIGHTY_FOUR, 1)])
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        // Fault was one-shot: the retry goes through.
        assert!(wf
            .create_order(fixtures::ALICE, [(fixtures::NINETEEN_EIGHTY_FOUR, 1)])
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn failed_calls_are_idempotent() {
        let wf = workflow();
        let before = wf.store().snapshot().await;
        for _ in 0..3 {
            let err = wf
                .create_order(fixtures::ALICE, [(fixtures::THE_HOBBIT, 99)])
                .await
                .unwrap_err();
            assert!(matches!(err, OrderError::InsufficientStock { .. }));
        }
        assert_eq!(wf.store().snapshot().await, before);
    }

    #[tokio::test]
    async fn unit_price_is_captured_at_order_time() {
        let wf = workflow();
        let id = wf
            .create_order(fixtures::ALICE, [(fixtures::PHILOSOPHERS_STONE, 1)])
            .await
            .unwrap();
        let order = wf.store().snapshot().await.order(id).unwrap();
        assert_eq!(order.items()[0].unit_price, Money::from_cents(1999));
        assert_eq!(order.created_at().timestamp_subsec_nanos() % 1_000, 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        /// Property: after any sequence of orders, each book's stock plus the
        /// units in committed orders equals its initial stock, and every
        /// failed order left the store exactly as it found it.
        #[test]
        fn stock_is_conserved_across_order_sequences(
            orders in prop::collection::vec(
                prop::collection::vec((0usize..6, 1i32..30i32), 1..4),
                1..12
            )
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let result: Result<(), TestCaseError> = rt.block_on(async {
                let wf = workflow();
                let initial = wf.store().snapshot().await;
                let mut committed = Vec::new();

                for lines in &orders {
                    let items: Vec<(&str, i32)> = lines
                        .iter()
                        .map(|(i, q)| (fixtures::BOOK_ISBNS[*i], *q))
                        .collect();
                    let before = wf.store().snapshot().await;
                    match wf.create_order(fixtures::ALICE, items).await {
                        Ok(id) => committed.push(id),
                        Err(OrderError::InsufficientStock { .. }) => {
                            prop_assert_eq!(&wf.store().snapshot().await, &before);
                        }
                        Err(other) => prop_assert!(false, "unexpected error: {other:?}"),
                    }
                }

                let after = wf.store().snapshot().await;
                for isbn in fixtures::BOOK_ISBNS {
                    let book_ref = BookRef::Isbn(Isbn::parse(isbn).unwrap());
                    let book = after.find_book(&book_ref).unwrap();
                    let sold: i32 = committed
                        .iter()
                        .filter_map(|id| after.order(*id))
                        .flat_map(|o| o.items().to_vec())
                        .filter(|item| item.book_id == book.id_typed())
                        .map(|item| item.quantity)
                        .sum();
                    prop_assert!(book.stock_quantity() >= 0);
                    prop_assert_eq!(
                        book.stock_quantity() + sold,
                        initial.find_book(&book_ref).unwrap().stock_quantity()
                    );
                }
                for id in &committed {
                    prop_assert!(after.order(*id).unwrap().is_balanced());
                }
                Ok(())
            });
            result?;
        }
    }
}
