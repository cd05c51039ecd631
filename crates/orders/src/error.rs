//! Order placement failures.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use bookstore_catalog::{BookRef, Isbn};
use bookstore_core::{BookId, DomainError};
use bookstore_customers::Email;

/// Which kind of referenced row was missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Customer,
    Book,
}

impl core::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            EntityKind::Customer => f.write_str("customer"),
            EntityKind::Book => f.write_str("book"),
        }
    }
}

/// Why an order was not placed.
///
/// Every variant means the transaction was rolled back: no order, no line
/// items and no stock change are visible afterwards.
///
/// ## Retry semantics
///
/// | variant | retry? |
/// |---|---|
/// | `InvalidRequest`, `NotFound`, `InsufficientStock` | no, deterministic for unchanged store state |
/// | `Conflict` | yes, the whole call may be retried by the caller |
/// | `StoreUnavailable` | caller's decision (connection/timeout) |
/// | `Store` | no |
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrderError {
    /// Malformed input, rejected before any store access.
    #[error("invalid order request: {0}")]
    InvalidRequest(String),

    /// The customer or a requested book does not exist.
    #[error("{entity} not found: {identifier}")]
    NotFound {
        entity: EntityKind,
        identifier: String,
    },

    /// A book has fewer units in stock than the (merged) requested quantity.
    #[error("insufficient stock for book {isbn}: {available} available, {requested} requested")]
    InsufficientStock {
        book: BookId,
        isbn: Isbn,
        available: i32,
        requested: i32,
    },

    /// The store detected a concurrent-access violation (serialization failure,
    /// deadlock, lock timeout).
    #[error("transaction conflict: {0}")]
    Conflict(String),

    /// Connection, transport, pool or timeout failure.
    #[error("data store unavailable: {0}")]
    StoreUnavailable(String),

    /// Any other store failure (constraint violation, decode error, ...).
    #[error("data store failure: {0}")]
    Store(String),
}

impl OrderError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn customer_not_found(email: &Email) -> Self {
        Self::NotFound {
            entity: EntityKind::Customer,
            identifier: email.to_string(),
        }
    }

    pub fn book_not_found(book: &BookRef) -> Self {
        Self::NotFound {
            entity: EntityKind::Book,
            identifier: book.to_string(),
        }
    }

    /// Whether re-running the same call may succeed without the store changing first.
    pub fn is_retryable(&self) -> bool {
        matches!(self, OrderError::Conflict(_))
    }
}

impl From<DomainError> for OrderError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                OrderError::InvalidRequest(msg)
            }
            DomainError::Conflict(msg) => OrderError::Conflict(msg),
            DomainError::InvariantViolation(msg) => OrderError::Store(msg),
            DomainError::NotFound(what) => OrderError::Store(format!("{what} not found")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_names_entity_and_identifier() {
        let email = Email::parse("ghost@example.com").unwrap();
        assert_eq!(
            OrderError::customer_not_found(&email).to_string(),
            "customer not found: ghost@example.com"
        );
        let book = BookRef::parse("978-0000000000").unwrap();
        assert_eq!(
            OrderError::book_not_found(&book).to_string(),
            "book not found: 978-0000000000"
        );
    }

    #[test]
    fn only_conflicts_are_retryable() {
        assert!(OrderError::Conflict("40001".into()).is_retryable());
        assert!(!OrderError::StoreUnavailable("down".into()).is_retryable());
        assert!(!OrderError::invalid("x").is_retryable());
    }

    #[test]
    fn domain_validation_maps_to_invalid_request() {
        let err: OrderError = DomainError::validation("quantity must be positive").into();
        assert_eq!(err, OrderError::InvalidRequest("quantity must be positive".into()));
    }
}
