//! Core types and traits
//!
//! Errors, values, query options, the view cache, the driver and table-level database
//! contracts, and the transaction and store built on top of them.

pub mod cache;
pub mod config;
pub mod database;
pub mod dialect;
pub mod error;
pub mod placeholder;
pub mod query;
pub mod store;
pub mod transaction;
pub mod value;

// Re-export commonly used types
pub use cache::{MemoryCache, NoopCache, ViewCache};
pub use config::DatabaseConfig;
pub use database::{Backend, Database, DatabaseTxn, UnitOfWork};
pub use dialect::Dialect;
pub use error::{DatabaseError, Result};
pub use placeholder::Placeholder;
pub use query::{Condition, Operator, OrderDirection, QueryOptions, ViewKind};
pub use store::{Store, DEFAULT_BATCH_SIZE};
pub use transaction::{Txn, TxnState};
pub use value::{from_row, from_rows, DatabaseResult, DatabaseRow, DatabaseValue, Record};
