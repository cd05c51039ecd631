//! Orders domain module.
//!
//! This crate contains the business rules for placing an order, implemented
//! purely as deterministic domain logic (no IO, no SQL, no storage):
//!
//! - [`OrderRequest`]: validates caller input and merges duplicate lines;
//! - [`OrderPlan`]: checks the customer, book existence and stock, in that order,
//!   against rows read inside a transaction, and prices every line;
//! - [`Order`] / [`OrderItem`]: the records a committed plan produces.
//!
//! Running a plan against a data store is the job of `bookstore-infra`.

pub mod error;
pub mod order;
pub mod plan;
pub mod request;

pub use error::{EntityKind, OrderError};
pub use order::{Order, OrderItem, OrderOutcome};
pub use plan::OrderPlan;
pub use request::{OrderLineRequest, OrderRequest};
