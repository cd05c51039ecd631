use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use bookstore_catalog::{Book, BookRef};
use bookstore_core::{BookId, OrderId};
use bookstore_customers::{Customer, Email};
use bookstore_orders::{Order, OrderError, OrderItem};

/// Failure reported by a data store adapter.
///
/// Adapters classify their native errors into these four buckets; the
/// workflow only ever sees this type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Serialization failure, deadlock or lock timeout. Safe to retry the whole unit of work.
    #[error("concurrent access conflict: {0}")]
    Conflict(String),

    /// Connection, pool or timeout failure.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A declared constraint (check, unique, foreign key) rejected a write.
    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("storage error: {0}")]
    Storage(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for OrderError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => OrderError::Conflict(msg),
            StoreError::Unavailable(msg) => OrderError::StoreUnavailable(msg),
            StoreError::Constraint(msg) | StoreError::Storage(msg) => OrderError::Store(msg),
        }
    }
}

/// One open unit of work against the store.
///
/// Nothing written through a transaction is visible to anyone else until
/// [`commit`](StoreTransaction::commit) succeeds. Dropping a transaction
/// without committing discards every write made through it.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Look up a customer by exact email and keep the row from being deleted
    /// until the transaction ends.
    async fn find_customer_by_email(&mut self, email: &Email) -> StoreResult<Option<Customer>>;

    /// Fetch the books matching `refs` and lock them for update.
    ///
    /// Locks are acquired in ascending `BookId` order regardless of the order
    /// of `refs`. Refs with no matching book are simply absent from the result.
    async fn lock_books(&mut self, refs: &[BookRef]) -> StoreResult<Vec<Book>>;

    /// Insert the order header row.
    async fn insert_order(&mut self, order: &Order) -> StoreResult<()>;

    /// Insert one order line. `line_no` is the 1-based position in the order.
    async fn insert_order_item(
        &mut self,
        order_id: OrderId,
        line_no: i32,
        item: &OrderItem,
    ) -> StoreResult<()>;

    /// Decrement stock by `quantity` only if at least `quantity` units remain.
    ///
    /// Returns the new stock level, or `None` if the guard rejected the update.
    async fn decrement_stock(&mut self, book_id: BookId, quantity: i32)
    -> StoreResult<Option<i32>>;

    async fn commit(self) -> StoreResult<()>;

    async fn rollback(self) -> StoreResult<()>;
}

/// A store that can open transactions.
#[async_trait]
pub trait DataStore: Send + Sync {
    type Transaction: StoreTransaction;

    async fn begin(&self) -> StoreResult<Self::Transaction>;
}

#[async_trait]
impl<S> DataStore for Arc<S>
where
    S: DataStore + ?Sized,
{
    type Transaction = S::Transaction;

    async fn begin(&self) -> StoreResult<Self::Transaction> {
        (**self).begin().await
    }
}
