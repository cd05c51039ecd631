use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{FromRow, Row};
use tracing::instrument;
use uuid::Uuid;

use bookstore_catalog::{BookRef, DiscountPercent, Rating};
use bookstore_core::{Money, OrderId, ReviewId};
use bookstore_customers::Email;
use bookstore_orders::Order;

use crate::store::postgres::{OrderHeaderRow, order_from_parts, order_item_from_row};
use crate::store::{PostgresStore, StoreError, StoreResult, map_sqlx_error};

use super::{AuthorBookCount, BookPrice, BookstoreQueries, RatedBook};

/// Escape `%`, `_` and `\` so `fragment` matches literally inside a LIKE pattern.
fn like_pattern(fragment: &str) -> String {
    let mut escaped = String::with_capacity(fragment.len() + 2);
    escaped.push('%');
    for c in fragment.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn decode(what: &str, err: sqlx::Error) -> StoreError {
    StoreError::Storage(format!("failed to decode {what}: {err}"))
}

#[async_trait]
impl BookstoreQueries for PostgresStore {
    #[instrument(skip(self))]
    async fn category_names(&self) -> StoreResult<Vec<String>> {
        sqlx::query_scalar::<_, String>("SELECT name FROM categories ORDER BY name")
            .fetch_all(self.pool())
            .await
            .map_err(|e| map_sqlx_error("category_names", e))
    }

    #[instrument(skip(self), fields(min_price = %min_price))]
    async fn books_priced_at_least(&self, min_price: Money) -> StoreResult<Vec<BookPrice>> {
        let rows = sqlx::query(
            r#"
            SELECT title, price
            FROM books
            WHERE price >= $1
            ORDER BY price DESC, title
            "#,
        )
        .bind(min_price.amount())
        .fetch_all(self.pool())
        .await
        .map_err(|e| map_sqlx_error("books_priced_at_least", e))?;

        rows.iter()
            .map(|row| {
                let title: String = row.try_get("title").map_err(|e| decode("book price", e))?;
                let price: Decimal = row.try_get("price").map_err(|e| decode("book price", e))?;
                let price = Money::new(price).map_err(|e| StoreError::Storage(e.to_string()))?;
                Ok(BookPrice { title, price })
            })
            .collect()
    }

    #[instrument(skip(self))]
    async fn books_by_author(&self, fragment: &str) -> StoreResult<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT b.title
            FROM books b
            JOIN authors a ON a.id = b.author_id
            WHERE a.name ILIKE $1
            ORDER BY b.title
            "#,
        )
        .bind(like_pattern(fragment))
        .fetch_all(self.pool())
        .await
        .map_err(|e| map_sqlx_error("books_by_author", e))
    }

    #[instrument(skip(self))]
    async fn author_book_counts(&self) -> StoreResult<Vec<AuthorBookCount>> {
        let rows = sqlx::query(
            r#"
            SELECT a.name, COUNT(b.id) AS books
            FROM authors a
            JOIN books b ON b.author_id = a.id
            GROUP BY a.id, a.name
            ORDER BY books DESC, a.name
            "#,
        )
        .fetch_all(self.pool())
        .await
        .map_err(|e| map_sqlx_error("author_book_counts", e))?;

        rows.iter()
            .map(|row| {
                Ok(AuthorBookCount {
                    author: row.try_get("name").map_err(|e| decode("author count", e))?,
                    books: row.try_get("books").map_err(|e| decode("author count", e))?,
                })
            })
            .collect()
    }

    #[instrument(skip(self, comment), fields(rating = rating.stars()))]
    async fn add_review(
        &self,
        book_title: &str,
        customer_email: &Email,
        rating: Rating,
        comment: Option<&str>,
    ) -> StoreResult<Option<ReviewId>> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO reviews (id, book_id, customer_id, rating, comment)
            SELECT $1, b.id, c.id, $4, $5
            FROM (SELECT id FROM books WHERE title = $2 ORDER BY id LIMIT 1) b,
                 customers c
            WHERE c.email = $3
            ON CONFLICT (book_id, customer_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(*ReviewId::new().as_uuid())
        .bind(book_title)
        .bind(customer_email.as_str())
        .bind(rating.stars())
        .bind(comment)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| map_sqlx_error("add_review", e))?;

        Ok(id.map(ReviewId::from_uuid))
    }

    #[instrument(skip(self), fields(percent = %discount.percent()))]
    async fn apply_discount(&self, category_name: &str, discount: DiscountPercent) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE books
            SET price = ROUND(price * (100 - $2) / 100, 2), updated_at = NOW()
            WHERE category_id = (SELECT id FROM categories WHERE name = $1)
            "#,
        )
        .bind(category_name)
        .bind(discount.percent())
        .execute(self.pool())
        .await
        .map_err(|e| map_sqlx_error("apply_discount", e))?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn top_rated_books(&self, limit: u32) -> StoreResult<Vec<RatedBook>> {
        let rows = sqlx::query(
            r#"
            SELECT b.title, a.name AS author, ROUND(AVG(r.rating), 2) AS average_rating
            FROM books b
            JOIN authors a ON a.id = b.author_id
            JOIN reviews r ON r.book_id = b.id
            GROUP BY b.id, b.title, a.name
            ORDER BY average_rating DESC, b.title
            LIMIT $1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await
        .map_err(|e| map_sqlx_error("top_rated_books", e))?;

        rows.iter()
            .map(|row| {
                Ok(RatedBook {
                    title: row.try_get("title").map_err(|e| decode("rated book", e))?,
                    author: row.try_get("author").map_err(|e| decode("rated book", e))?,
                    average_rating: row
                        .try_get("average_rating")
                        .map_err(|e| decode("rated book", e))?,
                })
            })
            .collect()
    }

    #[instrument(skip(self), fields(order_id = %id))]
    async fn find_order(&self, id: OrderId) -> StoreResult<Option<Order>> {
        let Some(row) = sqlx::query(
            r#"
            SELECT id, customer_id, total_amount, created_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(self.pool())
        .await
        .map_err(|e| map_sqlx_error("find_order", e))?
        else {
            return Ok(None);
        };
        let header = OrderHeaderRow::from_row(&row).map_err(|e| decode("order", e))?;

        let item_rows = sqlx::query(
            r#"
            SELECT oi.book_id, b.isbn, oi.quantity, oi.unit_price
            FROM order_items oi
            JOIN books b ON b.id = oi.book_id
            WHERE oi.order_id = $1
            ORDER BY oi.line_no
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(self.pool())
        .await
        .map_err(|e| map_sqlx_error("find_order_items", e))?;

        let items = item_rows
            .iter()
            .map(order_item_from_row)
            .collect::<StoreResult<Vec<_>>>()?;
        order_from_parts(header, items).map(Some)
    }

    #[instrument(skip(self))]
    async fn book_stock(&self, book: &BookRef) -> StoreResult<Option<i32>> {
        let query = match book {
            BookRef::Isbn(isbn) => {
                sqlx::query_scalar::<_, i32>("SELECT stock_quantity FROM books WHERE isbn = $1")
                    .bind(isbn.as_str())
            }
            BookRef::Id(id) => {
                sqlx::query_scalar::<_, i32>("SELECT stock_quantity FROM books WHERE id = $1")
                    .bind(*id.as_uuid())
            }
        };
        query
            .fetch_optional(self.pool())
            .await
            .map_err(|e| map_sqlx_error("book_stock", e))
    }

    #[instrument(skip(self))]
    async fn orders_for_customer(&self, customer_email: &Email) -> StoreResult<Vec<OrderId>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT o.id
            FROM orders o
            JOIN customers c ON c.id = o.customer_id
            WHERE c.email = $1
            ORDER BY o.created_at, o.id
            "#,
        )
        .bind(customer_email.as_str())
        .fetch_all(self.pool())
        .await
        .map_err(|e| map_sqlx_error("orders_for_customer", e))?;

        Ok(ids.into_iter().map(OrderId::from_uuid).collect())
    }

    #[instrument(skip(self))]
    async fn order_count(&self) -> StoreResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM orders")
            .fetch_one(self.pool())
            .await
            .map_err(|e| map_sqlx_error("order_count", e))
    }
}
