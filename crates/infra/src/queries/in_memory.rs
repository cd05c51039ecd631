use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::{Decimal, RoundingStrategy};

use bookstore_catalog::{BookRef, DiscountPercent, Rating, Review};
use bookstore_core::{AuthorId, DomainError, DomainResult, Money, OrderId, ReviewId};
use bookstore_customers::Email;
use bookstore_orders::Order;

use crate::store::{InMemoryStore, StoreError, StoreResult};

use super::{AuthorBookCount, BookPrice, BookstoreQueries, RatedBook};

#[async_trait]
impl BookstoreQueries for InMemoryStore {
    async fn category_names(&self) -> StoreResult<Vec<String>> {
        let state = self.lock_state().await;
        let mut names: Vec<String> = state.categories.values().map(|c| c.name.clone()).collect();
        names.sort();
        Ok(names)
    }

    async fn books_priced_at_least(&self, min_price: Money) -> StoreResult<Vec<BookPrice>> {
        let state = self.lock_state().await;
        let mut rows: Vec<BookPrice> = state
            .books
            .values()
            .filter(|b| b.price() >= min_price)
            .map(|b| BookPrice {
                title: b.title().to_string(),
                price: b.price(),
            })
            .collect();
        rows.sort_by(|a, b| b.price.cmp(&a.price).then_with(|| a.title.cmp(&b.title)));
        Ok(rows)
    }

    async fn books_by_author(&self, fragment: &str) -> StoreResult<Vec<String>> {
        let state = self.lock_state().await;
        let mut titles: Vec<String> = state
            .books
            .values()
            .filter(|b| {
                b.author_id()
                    .and_then(|id| state.authors.get(&id))
                    .is_some_and(|a| a.name_contains(fragment))
            })
            .map(|b| b.title().to_string())
            .collect();
        titles.sort();
        Ok(titles)
    }

    async fn author_book_counts(&self) -> StoreResult<Vec<AuthorBookCount>> {
        let state = self.lock_state().await;
        let mut counts: BTreeMap<AuthorId, i64> = BTreeMap::new();
        for author_id in state.books.values().filter_map(|b| b.author_id()) {
            *counts.entry(author_id).or_default() += 1;
        }
        let mut rows: Vec<AuthorBookCount> = counts
            .into_iter()
            .filter_map(|(id, books)| {
                state.authors.get(&id).map(|a| AuthorBookCount {
                    author: a.name.clone(),
                    books,
                })
            })
            .collect();
        rows.sort_by(|a, b| b.books.cmp(&a.books).then_with(|| a.author.cmp(&b.author)));
        Ok(rows)
    }

    async fn add_review(
        &self,
        book_title: &str,
        customer_email: &Email,
        rating: Rating,
        comment: Option<&str>,
    ) -> StoreResult<Option<ReviewId>> {
        let mut state = self.lock_state().await;
        let Some(book_id) = state
            .books
            .values()
            .find(|b| b.title() == book_title)
            .map(|b| b.id_typed())
        else {
            return Ok(None);
        };
        let Some(customer_id) = state.customer_by_email(customer_email).map(|c| c.id) else {
            return Ok(None);
        };

        let review = Review {
            id: ReviewId::new(),
            book_id,
            customer_id,
            rating,
            comment: comment.map(str::to_string),
            created_at: Utc::now(),
        };
        let id = review.id;
        review_outcome(state.add_review(review), id)
    }

    async fn apply_discount(&self, category_name: &str, discount: DiscountPercent) -> StoreResult<u64> {
        let mut state = self.lock_state().await;
        let Some(category_id) = state
            .categories
            .values()
            .find(|c| c.name == category_name)
            .map(|c| c.id)
        else {
            return Ok(0);
        };

        let mut updated = 0;
        for book in state
            .books
            .values_mut()
            .filter(|b| b.category_id() == Some(category_id))
        {
            book.set_price(discount.apply(book.price()));
            updated += 1;
        }
        Ok(updated)
    }

    async fn top_rated_books(&self, limit: u32) -> StoreResult<Vec<RatedBook>> {
        let state = self.lock_state().await;
        let mut ratings: BTreeMap<_, (i64, i64)> = BTreeMap::new();
        for review in state.reviews() {
            let entry = ratings.entry(review.book_id).or_insert((0, 0));
            entry.0 += i64::from(review.rating.stars());
            entry.1 += 1;
        }

        let mut rows: Vec<RatedBook> = ratings
            .into_iter()
            .filter_map(|(book_id, (sum, count))| {
                let book = state.books.get(&book_id)?;
                let author = state.authors.get(&book.author_id()?)?;
                let average = (Decimal::from(sum) / Decimal::from(count))
                    .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
                Some(RatedBook {
                    title: book.title().to_string(),
                    author: author.name.clone(),
                    average_rating: average,
                })
            })
            .collect();
        rows.sort_by(|a, b| {
            b.average_rating
                .cmp(&a.average_rating)
                .then_with(|| a.title.cmp(&b.title))
        });
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn find_order(&self, id: OrderId) -> StoreResult<Option<Order>> {
        Ok(self.lock_state().await.order(id))
    }

    async fn book_stock(&self, book: &BookRef) -> StoreResult<Option<i32>> {
        Ok(self.lock_state().await.find_book(book).map(|b| b.stock_quantity()))
    }

    async fn orders_for_customer(&self, customer_email: &Email) -> StoreResult<Vec<OrderId>> {
        let state = self.lock_state().await;
        Ok(state
            .customer_by_email(customer_email)
            .map(|c| state.orders_for(c.id))
            .unwrap_or_default())
    }

    async fn order_count(&self) -> StoreResult<i64> {
        Ok(self.lock_state().await.order_count() as i64)
    }
}

/// A repeated (book, customer) review is `None`; anything else is a store failure.
fn review_outcome(inserted: DomainResult<()>, id: ReviewId) -> StoreResult<Option<ReviewId>> {
    match inserted {
        Ok(()) => Ok(Some(id)),
        Err(DomainError::Conflict(_)) => Ok(None),
        Err(other) => Err(StoreError::Constraint(other.to_string())),
    }
}
