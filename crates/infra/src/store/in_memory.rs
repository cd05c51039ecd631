//! In-memory data store.
//!
//! Intended for tests/dev. Transactions are fully serial: `begin` takes an
//! exclusive lock on the whole dataset and holds it until the transaction is
//! committed, rolled back or dropped. Writes go to a private working copy
//! that replaces the shared state only on commit.
//!
//! The store mirrors the relational constraints the Postgres schema declares
//! (uniqueness, foreign keys, non-negative stock, positive quantities) so that
//! workflow bugs surface the same way against either backend.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use bookstore_catalog::{Author, Book, BookRef, Category, Review};
use bookstore_core::{
    AuthorId, BookId, CategoryId, CustomerId, DomainError, DomainResult, Entity, Money, OrderId,
};
use bookstore_customers::{Customer, Email};
use bookstore_orders::{Order, OrderItem};

use super::r#trait::{DataStore, StoreError, StoreResult, StoreTransaction};

/// Stored order header (the `orders` row, without its lines).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRow {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub total_amount: Money,
    pub created_at: DateTime<Utc>,
}

/// Stored order line (the `order_items` row).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderItemRow {
    pub order_id: OrderId,
    pub line_no: i32,
    pub item: OrderItem,
}

/// The complete bookstore dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookstoreState {
    pub(crate) authors: BTreeMap<AuthorId, Author>,
    pub(crate) categories: BTreeMap<CategoryId, Category>,
    pub(crate) books: BTreeMap<BookId, Book>,
    pub(crate) customers: BTreeMap<CustomerId, Customer>,
    pub(crate) reviews: Vec<Review>,
    pub(crate) orders: BTreeMap<OrderId, OrderRow>,
    pub(crate) order_items: Vec<OrderItemRow>,
}

impl BookstoreState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_author(&mut self, author: Author) -> DomainResult<()> {
        insert_row(&mut self.authors, author, "author")
    }

    pub fn add_category(&mut self, category: Category) -> DomainResult<()> {
        if self.categories.values().any(|c| c.name == category.name) {
            return Err(DomainError::conflict(format!("category '{}'", category.name)));
        }
        insert_row(&mut self.categories, category, "category")
    }

    pub fn add_book(&mut self, book: Book) -> DomainResult<()> {
        if self.books.values().any(|b| b.isbn() == book.isbn()) {
            return Err(DomainError::conflict(format!("isbn {}", book.isbn())));
        }
        if let Some(author_id) = book.author_id() {
            if !self.authors.contains_key(&author_id) {
                return Err(DomainError::not_found(format!("author {author_id}")));
            }
        }
        if let Some(category_id) = book.category_id() {
            if !self.categories.contains_key(&category_id) {
                return Err(DomainError::not_found(format!("category {category_id}")));
            }
        }
        insert_row(&mut self.books, book, "book")
    }

    pub fn add_customer(&mut self, customer: Customer) -> DomainResult<()> {
        if self.customers.values().any(|c| c.email == customer.email) {
            return Err(DomainError::conflict(format!("email {}", customer.email)));
        }
        insert_row(&mut self.customers, customer, "customer")
    }

    pub fn add_review(&mut self, review: Review) -> DomainResult<()> {
        if !self.books.contains_key(&review.book_id) {
            return Err(DomainError::not_found(format!("book {}", review.book_id)));
        }
        if !self.customers.contains_key(&review.customer_id) {
            return Err(DomainError::not_found(format!("customer {}", review.customer_id)));
        }
        if self.reviews.iter().any(|r| {
            r.same_row(&review) || (r.book_id == review.book_id && r.customer_id == review.customer_id)
        }) {
            return Err(DomainError::conflict(format!(
                "review of book {} by customer {}",
                review.book_id, review.customer_id
            )));
        }
        self.reviews.push(review);
        Ok(())
    }

    pub fn book(&self, id: BookId) -> Option<&Book> {
        self.books.get(&id)
    }

    pub fn find_book(&self, book_ref: &BookRef) -> Option<&Book> {
        self.books.values().find(|b| b.matches(book_ref))
    }

    pub fn customer_by_email(&self, email: &Email) -> Option<&Customer> {
        self.customers.values().find(|c| &c.email == email)
    }

    pub fn books(&self) -> impl Iterator<Item = &Book> {
        self.books.values()
    }

    pub fn reviews(&self) -> &[Review] {
        &self.reviews
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn order_item_count(&self) -> usize {
        self.order_items.len()
    }

    /// Reassemble an order with its lines in line order.
    pub fn order(&self, id: OrderId) -> Option<Order> {
        let header = self.orders.get(&id)?;
        let mut lines: Vec<&OrderItemRow> =
            self.order_items.iter().filter(|r| r.order_id == id).collect();
        lines.sort_by_key(|r| r.line_no);
        Some(Order::from_parts(
            header.id,
            header.customer_id,
            header.total_amount,
            header.created_at,
            lines.into_iter().map(|r| r.item.clone()).collect(),
        ))
    }

    /// Orders placed by `customer_id`, oldest first.
    pub fn orders_for(&self, customer_id: CustomerId) -> Vec<OrderId> {
        let mut rows: Vec<&OrderRow> = self
            .orders
            .values()
            .filter(|o| o.customer_id == customer_id)
            .collect();
        rows.sort_by_key(|o| (o.created_at, o.id));
        rows.into_iter().map(|o| o.id).collect()
    }

    fn insert_order_row(&mut self, order: &Order) -> StoreResult<()> {
        if self.orders.contains_key(&order.id_typed()) {
            return Err(StoreError::Constraint(format!(
                "duplicate order id {}",
                order.id_typed()
            )));
        }
        if !self.customers.contains_key(&order.customer_id()) {
            return Err(StoreError::Constraint(format!(
                "order references unknown customer {}",
                order.customer_id()
            )));
        }
        self.orders.insert(
            order.id_typed(),
            OrderRow {
                id: order.id_typed(),
                customer_id: order.customer_id(),
                total_amount: order.total_amount(),
                created_at: order.created_at(),
            },
        );
        Ok(())
    }

    fn insert_order_item_row(
        &mut self,
        order_id: OrderId,
        line_no: i32,
        item: &OrderItem,
    ) -> StoreResult<()> {
        if !self.orders.contains_key(&order_id) {
            return Err(StoreError::Constraint(format!(
                "order item references unknown order {order_id}"
            )));
        }
        if !self.books.contains_key(&item.book_id) {
            return Err(StoreError::Constraint(format!(
                "order item references unknown book {}",
                item.book_id
            )));
        }
        if item.quantity <= 0 {
            return Err(StoreError::Constraint(format!(
                "order item quantity must be positive, got {}",
                item.quantity
            )));
        }
        if self.order_items.iter().any(|r| {
            r.order_id == order_id && (r.item.book_id == item.book_id || r.line_no == line_no)
        }) {
            return Err(StoreError::Constraint(format!(
                "duplicate order item for order {order_id}, line {line_no}"
            )));
        }
        self.order_items.push(OrderItemRow {
            order_id,
            line_no,
            item: item.clone(),
        });
        Ok(())
    }

    fn decrement_book_stock(&mut self, book_id: BookId, quantity: i32) -> StoreResult<Option<i32>> {
        if quantity <= 0 {
            return Err(StoreError::Constraint(format!(
                "stock decrement must be positive, got {quantity}"
            )));
        }
        let Some(book) = self.books.get_mut(&book_id) else {
            return Ok(None);
        };
        if !book.can_supply(quantity) {
            return Ok(None);
        }
        book.take_stock(quantity)
            .map_err(|e| StoreError::Constraint(e.to_string()))?;
        Ok(Some(book.stock_quantity()))
    }
}

fn insert_row<E: Entity>(
    rows: &mut BTreeMap<E::Id, E>,
    row: E,
    kind: &str,
) -> DomainResult<()> {
    let id = *row.id();
    if rows.contains_key(&id) {
        return Err(DomainError::conflict(format!("{kind} {id}")));
    }
    rows.insert(id, row);
    Ok(())
}

/// Store operation at which an injected failure fires.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    Begin,
    FindCustomer,
    LockBooks,
    InsertOrder,
    InsertOrderItem,
    DecrementStock,
    Commit,
}

type Faults = Arc<Mutex<HashMap<FaultPoint, StoreError>>>;

fn take_fault(faults: &Faults, point: FaultPoint) -> StoreResult<()> {
    let mut faults = faults
        .lock()
        .map_err(|_| StoreError::Storage("fault table lock poisoned".to_string()))?;
    match faults.remove(&point) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Shared-state in-memory store. Clones share the same dataset.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<AsyncMutex<BookstoreState>>,
    faults: Faults,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: BookstoreState) -> Self {
        Self {
            state: Arc::new(AsyncMutex::new(state)),
            faults: Faults::default(),
        }
    }

    /// Copy of the committed dataset. Waits for any open transaction to finish.
    pub async fn snapshot(&self) -> BookstoreState {
        self.state.lock().await.clone()
    }

    /// Make the next call at `point` fail with `error`. Each injected fault fires once.
    pub fn inject_fault(&self, point: FaultPoint, error: StoreError) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.insert(point, error);
        }
    }

    pub(crate) async fn lock_state(&self) -> tokio::sync::MutexGuard<'_, BookstoreState> {
        self.state.lock().await
    }
}

/// Open in-memory transaction holding the store's exclusive lock.
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<BookstoreState>,
    working: BookstoreState,
    faults: Faults,
}

impl core::fmt::Debug for InMemoryTransaction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InMemoryTransaction")
            .field("orders", &self.working.orders.len())
            .field("order_items", &self.working.order_items.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DataStore for InMemoryStore {
    type Transaction = InMemoryTransaction;

    async fn begin(&self) -> StoreResult<InMemoryTransaction> {
        take_fault(&self.faults, FaultPoint::Begin)?;
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(InMemoryTransaction {
            guard,
            working,
            faults: Arc::clone(&self.faults),
        })
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn find_customer_by_email(&mut self, email: &Email) -> StoreResult<Option<Customer>> {
        take_fault(&self.faults, FaultPoint::FindCustomer)?;
        Ok(self.working.customer_by_email(email).cloned())
    }

    async fn lock_books(&mut self, refs: &[BookRef]) -> StoreResult<Vec<Book>> {
        take_fault(&self.faults, FaultPoint::LockBooks)?;
        // BTreeMap iteration is already ascending by id.
        Ok(self
            .working
            .books
            .values()
            .filter(|b| refs.iter().any(|r| b.matches(r)))
            .cloned()
            .collect())
    }

    async fn insert_order(&mut self, order: &Order) -> StoreResult<()> {
        take_fault(&self.faults, FaultPoint::InsertOrder)?;
        self.working.insert_order_row(order)
    }

    async fn insert_order_item(
        &mut self,
        order_id: OrderId,
        line_no: i32,
        item: &OrderItem,
    ) -> StoreResult<()> {
        take_fault(&self.faults, FaultPoint::InsertOrderItem)?;
        self.working.insert_order_item_row(order_id, line_no, item)
    }

    async fn decrement_stock(
        &mut self,
        book_id: BookId,
        quantity: i32,
    ) -> StoreResult<Option<i32>> {
        take_fault(&self.faults, FaultPoint::DecrementStock)?;
        self.working.decrement_book_stock(book_id, quantity)
    }

    async fn commit(mut self) -> StoreResult<()> {
        take_fault(&self.faults, FaultPoint::Commit)?;
        *self.guard = self.working;
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        Ok(())
    }
}
