//! Postgres-backed data store.
//!
//! ## Locking
//!
//! Transactions run at the configured isolation level (READ COMMITTED by
//! default). Correctness does not depend on the level:
//!
//! - the customer row is read `FOR KEY SHARE`, so it cannot be deleted while
//!   an order referencing it is being written;
//! - all requested book rows are locked with one `SELECT ... ORDER BY id FOR UPDATE`,
//!   so two orders touching overlapping books always lock in the same order;
//! - the stock decrement is guarded (`stock_quantity >= $1`) and reports
//!   whether it applied.
//!
//! ## Error Mapping
//!
//! | SQLx error | SQLSTATE | StoreError |
//! |---|---|---|
//! | Database | `40001` serialization failure, `40P01` deadlock, `55P03` lock not available | `Conflict` |
//! | Database | `08xxx` connection, `57P01..03` shutdown, `57014` statement timeout | `Unavailable` |
//! | Database | `23xxx` integrity constraint | `Constraint` |
//! | Io, Tls, PoolTimedOut, PoolClosed, WorkerCrashed | n/a | `Unavailable` |
//! | anything else | any other | `Storage` |

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{Span, instrument};
use uuid::Uuid;

use bookstore_catalog::{Book, BookRef, Isbn};
use bookstore_core::{AuthorId, BookId, CategoryId, CustomerId, Money, OrderId};
use bookstore_customers::{Customer, Email};
use bookstore_orders::{Order, OrderItem};

use crate::config::{DatabaseConfig, IsolationLevel};

use super::r#trait::{DataStore, StoreError, StoreResult, StoreTransaction};

const SCHEMA_SQL: &str = include_str!("../../schema/bookstore.sql");

/// Postgres-backed bookstore store.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
    isolation: IsolationLevel,
    statement_timeout: Option<Duration>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
            isolation: IsolationLevel::default(),
            statement_timeout: None,
        }
    }

    pub fn with_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = Some(timeout);
        self
    }

    /// Open a pool from `config` and apply its transaction settings.
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let pool = config.connect().await?;
        let mut store = Self::new(pool).with_isolation(config.isolation);
        store.statement_timeout = config.statement_timeout();
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    /// Create the bookstore tables if they do not exist yet.
    #[instrument(skip(self))]
    pub async fn install_schema(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("install_schema", e))?;
        Ok(())
    }
}

/// Open Postgres transaction. Dropping it without committing rolls back.
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

impl core::fmt::Debug for PostgresTransaction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PostgresTransaction").finish_non_exhaustive()
    }
}

#[async_trait]
impl DataStore for PostgresStore {
    type Transaction = PostgresTransaction;

    #[instrument(skip(self), fields(isolation = ?self.isolation))]
    async fn begin(&self) -> StoreResult<PostgresTransaction> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query(self.isolation.set_transaction_sql())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_isolation", e))?;

        if let Some(timeout) = self.statement_timeout {
            sqlx::query("SELECT set_config('statement_timeout', $1, true)")
                .bind(format!("{}ms", timeout.as_millis()))
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("set_statement_timeout", e))?;
        }

        Ok(PostgresTransaction { tx })
    }
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    #[instrument(skip(self))]
    async fn find_customer_by_email(&mut self, email: &Email) -> StoreResult<Option<Customer>> {
        let row = sqlx::query(
            r#"
            SELECT id, first_name, last_name, email, phone
            FROM customers
            WHERE email = $1
            FOR KEY SHARE
            "#,
        )
        .bind(email.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("find_customer_by_email", e))?;

        row.as_ref().map(customer_from_row).transpose()
    }

    #[instrument(skip(self, refs), fields(refs = refs.len(), locked = tracing::field::Empty))]
    async fn lock_books(&mut self, refs: &[BookRef]) -> StoreResult<Vec<Book>> {
        let mut isbns: Vec<String> = Vec::new();
        let mut ids: Vec<Uuid> = Vec::new();
        for r in refs {
            match r {
                BookRef::Isbn(isbn) => isbns.push(isbn.as_str().to_string()),
                BookRef::Id(id) => ids.push(*id.as_uuid()),
            }
        }

        let rows = sqlx::query(
            r#"
            SELECT id, isbn, title, author_id, category_id, price, stock_quantity
            FROM books
            WHERE isbn = ANY($1) OR id = ANY($2)
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(&isbns)
        .bind(&ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lock_books", e))?;

        Span::current().record("locked", rows.len());
        rows.iter().map(book_from_row).collect()
    }

    #[instrument(skip(self, order), fields(order_id = %order.id_typed()))]
    async fn insert_order(&mut self, order: &Order) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, customer_id, total_amount, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(*order.id_typed().as_uuid())
        .bind(*order.customer_id().as_uuid())
        .bind(order.total_amount().amount())
        .bind(order.created_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;
        Ok(())
    }

    #[instrument(skip(self, item), fields(book_id = %item.book_id))]
    async fn insert_order_item(
        &mut self,
        order_id: OrderId,
        line_no: i32,
        item: &OrderItem,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO order_items (order_id, line_no, book_id, quantity, unit_price)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(line_no)
        .bind(item.book_id.as_uuid())
        .bind(item.quantity)
        .bind(item.unit_price.amount())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order_item", e))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn decrement_stock(
        &mut self,
        book_id: BookId,
        quantity: i32,
    ) -> StoreResult<Option<i32>> {
        sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE books
            SET stock_quantity = stock_quantity - $1, updated_at = NOW()
            WHERE id = $2 AND stock_quantity >= $1
            RETURNING stock_quantity
            "#,
        )
        .bind(quantity)
        .bind(book_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("decrement_stock", e))
    }

    async fn commit(self) -> StoreResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self) -> StoreResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

/// Classify a SQLx error for `operation` into a [`StoreError`].
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            let code = db_err.code().map(|c| c.into_owned()).unwrap_or_default();
            match code.as_str() {
                "40001" | "40P01" | "55P03" => StoreError::Conflict(format!("{msg} ({code})")),
                "57014" | "57P01" | "57P02" | "57P03" => {
                    StoreError::Unavailable(format!("{msg} ({code})"))
                }
                c if c.starts_with("08") => StoreError::Unavailable(format!("{msg} ({code})")),
                c if c.starts_with("23") => StoreError::Constraint(format!("{msg} ({code})")),
                _ => StoreError::Storage(msg),
            }
        }
        sqlx::Error::Io(e) => StoreError::Unavailable(format!("io error in {operation}: {e}")),
        sqlx::Error::Tls(e) => StoreError::Unavailable(format!("tls error in {operation}: {e}")),
        sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool timed out in {operation}"))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::WorkerCrashed => {
            StoreError::Unavailable(format!("connection worker crashed in {operation}"))
        }
        _ => StoreError::Storage(format!("sqlx error in {operation}: {err}")),
    }
}

fn decode_error(what: &str, err: impl core::fmt::Display) -> StoreError {
    StoreError::Storage(format!("failed to decode {what} row: {err}"))
}

fn customer_from_row(row: &PgRow) -> StoreResult<Customer> {
    let id: Uuid = row.try_get("id").map_err(|e| decode_error("customer", e))?;
    let first_name: String = row.try_get("first_name").map_err(|e| decode_error("customer", e))?;
    let last_name: String = row.try_get("last_name").map_err(|e| decode_error("customer", e))?;
    let email: String = row.try_get("email").map_err(|e| decode_error("customer", e))?;
    let phone: Option<String> = row.try_get("phone").map_err(|e| decode_error("customer", e))?;

    let email = Email::parse(&email).map_err(|e| decode_error("customer", e))?;
    let mut customer = Customer::new(CustomerId::from_uuid(id), first_name, last_name, email);
    customer.phone = phone;
    Ok(customer)
}

pub(crate) fn book_from_row(row: &PgRow) -> StoreResult<Book> {
    let id: Uuid = row.try_get("id").map_err(|e| decode_error("book", e))?;
    let isbn: String = row.try_get("isbn").map_err(|e| decode_error("book", e))?;
    let title: String = row.try_get("title").map_err(|e| decode_error("book", e))?;
    let author_id: Option<Uuid> = row.try_get("author_id").map_err(|e| decode_error("book", e))?;
    let category_id: Option<Uuid> =
        row.try_get("category_id").map_err(|e| decode_error("book", e))?;
    let price: Decimal = row.try_get("price").map_err(|e| decode_error("book", e))?;
    let stock: i32 = row.try_get("stock_quantity").map_err(|e| decode_error("book", e))?;

    let isbn = Isbn::parse(&isbn).map_err(|e| decode_error("book", e))?;
    let price = Money::new(price).map_err(|e| decode_error("book", e))?;
    let mut book = Book::new(BookId::from_uuid(id), isbn, title, price, stock)
        .map_err(|e| decode_error("book", e))?;
    if let Some(author_id) = author_id {
        book = book.with_author(AuthorId::from_uuid(author_id));
    }
    if let Some(category_id) = category_id {
        book = book.with_category(CategoryId::from_uuid(category_id));
    }
    Ok(book)
}

/// Header columns of an `orders` row.
pub(crate) struct OrderHeaderRow {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for OrderHeaderRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(OrderHeaderRow {
            id: row.try_get("id")?,
            customer_id: row.try_get("customer_id")?,
            total_amount: row.try_get("total_amount")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

pub(crate) fn order_item_from_row(row: &PgRow) -> StoreResult<OrderItem> {
    let book_id: Uuid = row.try_get("book_id").map_err(|e| decode_error("order item", e))?;
    let isbn: String = row.try_get("isbn").map_err(|e| decode_error("order item", e))?;
    let quantity: i32 = row.try_get("quantity").map_err(|e| decode_error("order item", e))?;
    let unit_price: Decimal = row.try_get("unit_price").map_err(|e| decode_error("order item", e))?;
    Ok(OrderItem {
        book_id: BookId::from_uuid(book_id),
        isbn: Isbn::parse(&isbn).map_err(|e| decode_error("order item", e))?,
        quantity,
        unit_price: Money::new(unit_price).map_err(|e| decode_error("order item", e))?,
    })
}

pub(crate) fn order_from_parts(header: OrderHeaderRow, items: Vec<OrderItem>) -> StoreResult<Order> {
    let total = Money::new(header.total_amount).map_err(|e| decode_error("order", e))?;
    Ok(Order::from_parts(
        OrderId::from_uuid(header.id),
        CustomerId::from_uuid(header.customer_id),
        total,
        header.created_at,
        items,
    ))
}
