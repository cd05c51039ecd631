//! Catalog queries and order read-back.
//!
//! Every query is a single parameterized statement against the store; none of
//! them participates in an order-placement transaction.

pub mod in_memory;
pub mod postgres;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bookstore_catalog::{BookRef, DiscountPercent, Rating};
use bookstore_core::{Money, OrderId, ReviewId};
use bookstore_customers::Email;
use bookstore_orders::Order;

use crate::store::StoreResult;

/// Title and current price of a book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookPrice {
    pub title: String,
    pub price: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorBookCount {
    pub author: String,
    pub books: i64,
}

/// A reviewed book with its average rating, rounded to two decimals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatedBook {
    pub title: String,
    pub author: String,
    pub average_rating: Decimal,
}

/// Read and maintenance queries over the bookstore catalog.
#[async_trait]
pub trait BookstoreQueries: Send + Sync {
    /// All category names, alphabetically.
    async fn category_names(&self) -> StoreResult<Vec<String>>;

    /// Books priced at or above `min_price`, most expensive first, ties by title.
    async fn books_priced_at_least(&self, min_price: Money) -> StoreResult<Vec<BookPrice>>;

    /// Titles of books whose author's name contains `fragment`, case-insensitively, by title.
    async fn books_by_author(&self, fragment: &str) -> StoreResult<Vec<String>>;

    /// Book count per author, authors without books omitted, count descending then name.
    async fn author_book_counts(&self) -> StoreResult<Vec<AuthorBookCount>>;

    /// Record a review of the book titled `book_title` by the customer with `customer_email`.
    ///
    /// Returns `None` when the book or customer does not exist, or the customer
    /// has already reviewed that book.
    async fn add_review(
        &self,
        book_title: &str,
        customer_email: &Email,
        rating: Rating,
        comment: Option<&str>,
    ) -> StoreResult<Option<ReviewId>>;

    /// Reduce the price of every book in `category_name` by `discount`.
    ///
    /// Prices are rounded to cents. Returns the number of books updated.
    async fn apply_discount(&self, category_name: &str, discount: DiscountPercent) -> StoreResult<u64>;

    /// The `limit` best-rated books that have at least one review, best first, ties by title.
    async fn top_rated_books(&self, limit: u32) -> StoreResult<Vec<RatedBook>>;

    /// A committed order with its items in line order.
    async fn find_order(&self, id: OrderId) -> StoreResult<Option<Order>>;

    /// Current stock of a book, `None` if it does not exist.
    async fn book_stock(&self, book: &BookRef) -> StoreResult<Option<i32>>;

    /// Ids of the orders placed by `customer_email`, oldest first.
    async fn orders_for_customer(&self, customer_email: &Email) -> StoreResult<Vec<OrderId>>;

    async fn order_count(&self) -> StoreResult<i64>;
}
