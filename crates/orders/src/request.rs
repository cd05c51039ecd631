//! Caller input for placing an order.

use serde::{Deserialize, Serialize};

use bookstore_catalog::BookRef;
use bookstore_customers::Email;

use crate::error::OrderError;

/// One requested line: which book, how many.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineRequest {
    pub book: BookRef,
    pub quantity: i32,
}

impl OrderLineRequest {
    pub fn new(book: impl Into<BookRef>, quantity: i32) -> Self {
        Self {
            book: book.into(),
            quantity,
        }
    }
}

/// A validated order request.
///
/// Construction guarantees: the email is non-blank, there is at least one
/// line, every quantity is positive, and no two lines name the same
/// [`BookRef`]. Duplicates are merged by summing quantities; the merged line
/// keeps the position of the first occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderRequest {
    customer_email: Email,
    lines: Vec<OrderLineRequest>,
}

impl OrderRequest {
    /// Build a request from raw caller input: an email and `(isbn-or-id, quantity)` pairs.
    pub fn new<I, S>(customer_email: &str, items: I) -> Result<Self, OrderError>
    where
        I: IntoIterator<Item = (S, i32)>,
        S: AsRef<str>,
    {
        let email = Email::lookup(customer_email)?;
        let mut lines = Vec::new();
        for (idx, (raw, quantity)) in items.into_iter().enumerate() {
            let book = BookRef::parse(raw.as_ref())
                .map_err(|e| OrderError::invalid(format!("item {idx}: {e}")))?;
            lines.push(OrderLineRequest { book, quantity });
        }
        Self::from_lines(email, lines)
    }

    /// Build a request from already-typed lines.
    pub fn from_lines(
        customer_email: Email,
        lines: impl IntoIterator<Item = OrderLineRequest>,
    ) -> Result<Self, OrderError> {
        let lines = merge_lines(lines)?;
        if lines.is_empty() {
            return Err(OrderError::invalid("order must contain at least one item"));
        }
        Ok(Self {
            customer_email,
            lines,
        })
    }

    pub fn customer_email(&self) -> &Email {
        &self.customer_email
    }

    /// Lines in request order, duplicates already merged.
    pub fn lines(&self) -> &[OrderLineRequest] {
        &self.lines
    }

    pub fn book_refs(&self) -> Vec<BookRef> {
        self.lines.iter().map(|l| l.book.clone()).collect()
    }

    pub fn total_quantity(&self) -> i64 {
        self.lines.iter().map(|l| i64::from(l.quantity)).sum()
    }
}

/// Stable merge of lines naming the same book reference.
fn merge_lines(
    lines: impl IntoIterator<Item = OrderLineRequest>,
) -> Result<Vec<OrderLineRequest>, OrderError> {
    let mut merged: Vec<OrderLineRequest> = Vec::new();
    for line in lines {
        if line.quantity <= 0 {
            return Err(OrderError::invalid(format!(
                "quantity for {} must be positive, got {}",
                line.book, line.quantity
            )));
        }
        match merged.iter_mut().find(|m| m.book == line.book) {
            Some(existing) => {
                existing.quantity = existing.quantity.checked_add(line.quantity).ok_or_else(|| {
                    OrderError::invalid(format!("total quantity for {} overflows", line.book))
                })?;
            }
            None => merged.push(line),
        }
    }
    Ok(merged)
}
