//! Transactional data store boundary.
//!
//! The order workflow talks to storage only through [`DataStore`] and
//! [`StoreTransaction`]; the adapters below decide how atomicity and row
//! locking are achieved.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::{BookstoreState, FaultPoint, InMemoryStore, InMemoryTransaction};
pub use postgres::{PostgresStore, PostgresTransaction};
pub(crate) use postgres::map_sqlx_error;
pub use r#trait::{DataStore, StoreError, StoreResult, StoreTransaction};
