//! Failures raised by the bookstore's domain types.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Why a domain value could not be built or changed.
///
/// Only deterministic failures live here: the same input always produces the
/// same error. Storage and transport failures have their own types in the
/// infrastructure crate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Caller input is malformed (blank name, negative price, bad ISBN, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The change would leave a row in an impossible state (negative stock, empty order).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A referenced row does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// A unique value (ISBN, email, category name, one review per book and customer) is taken.
    #[error("already exists: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}
