//! Infrastructure layer: configuration, data stores, order placement and catalog queries.

pub mod config;
pub mod fixtures;
pub mod queries;
pub mod store;
pub mod workflow;


pub use config::{ConfigError, DatabaseConfig, IsolationLevel};
pub use queries::{AuthorBookCount, BookPrice, BookstoreQueries, RatedBook};
pub use store::{
    BookstoreState, DataStore, FaultPoint, InMemoryStore, PostgresStore, StoreError, StoreResult,
    StoreTransaction,
};
pub use workflow::OrderWorkflow;
