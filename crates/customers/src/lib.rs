//! Customers domain module.
//!
//! A customer is identified to the outside world by email; the order workflow
//! resolves that email to a `CustomerId` inside its transaction.

pub mod customer;

pub use customer::{Customer, Email};
