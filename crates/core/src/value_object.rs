//! Value object trait: equality by value, not identity.
//!
//! Value objects are domain objects that have **no identity** - they are defined entirely
//! by their attribute values. Two value objects with the same values are considered equal.

/// Marker trait for value objects.
///
/// Value objects are domain objects that are **immutable** and **compared by value**.
/// They represent concepts where identity doesn't matter - only the values matter.
///
/// ## Value Object vs Entity
///
/// - **Value Object**: No identity (two value objects with same values are equal)
/// - **Entity**: Has identity (two entities with same ID are the same entity)
///
/// Example:
/// - `Money(12.99)` or an ISBN is a value object
/// - `Book { id: BookId(...), title: "..." }` is an entity
///
/// ## Construction
///
/// Bookstore value objects validate on construction (`Isbn::parse`, `Email::parse`,
/// `Money::new`, ...) so an instance that exists is always well-formed. Code that
/// receives one never re-checks it.
///
/// ## Usage Pattern
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq)]
/// struct Rating(u8);
///
/// impl ValueObject for Rating {}
///
/// assert_eq!(Rating(5), Rating(5)); // Equal by value, not identity
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
