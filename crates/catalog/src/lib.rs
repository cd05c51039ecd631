//! Catalog domain module: books and the reference data around them.
//!
//! This crate contains the bookstore's catalog rows as validated domain types
//! (no IO, no SQL, no storage).

pub mod author;
pub mod book;
pub mod category;
pub mod review;

pub use author::Author;
pub use book::{Book, BookRef, Isbn};
pub use category::{Category, DiscountPercent};
pub use review::{Rating, Review};
