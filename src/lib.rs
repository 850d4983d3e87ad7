//! # rust_ark
//!
//! A transactional data-access layer for relational backends.
//!
//! - **Units of work**: every [`Txn`](core::Txn) wraps one backend transaction. Reads go
//!   through a shared view cache first; results read on a miss are kept as pending views
//!   and promoted into the cache only when the transaction commits.
//! - **Bounded read batching**: a transaction holds at most `batch_size` pending views.
//!   Overflow fails immediately with [`DatabaseError::BatchExhausted`].
//! - **Sticky errors**: once an operation fails, every later operation on the same
//!   transaction returns that error until it is rolled back.
//! - **Migrations and seeds**: versioned migration scripts are applied when a database
//!   is opened. On local hosts versioned seed directories are interleaved with them, and
//!   a failed run reverts everything it applied.
//!
//! ## Supported Databases
//!
//! | Database | Feature | Placeholders |
//! |----------|---------|--------------|
//! | SQLite | `sqlite` (default) | `?` |
//! | PostgreSQL | `postgres` | `$1, $2, ...` |
//! | Redshift | `postgres` | `$1, $2, ...` |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rust_ark::prelude::*;
//! use rust_ark::migration::FsSource;
//! use std::sync::Arc;
//!
//! #[derive(Debug, serde::Deserialize)]
//! struct User {
//!     id: i64,
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = DatabaseConfig::new()
//!         .with_migration_source(Arc::new(FsSource::new("db")))
//!         .with_migration_directory("migrations");
//!
//!     let store = Store::connect("sqlite", "sqlite://localhost/tmp/app.db", config).await?;
//!
//!     let mut tx = store.txn(false).await?;
//!     tx.insert("users", &Record::new().set("name", "Alice")).await?;
//!     tx.commit().await?;
//!
//!     let mut tx = store.txn(true).await?;
//!     let users: Vec<User> = tx
//!         .list_as("users", &QueryOptions::new().order_by_asc("id"))
//!         .await?;
//!     tx.commit().await?;
//!
//!     for user in users {
//!         println!("{}: {}", user.id, user.name);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Project Structure
//!
//! ```text
//! src/
//! ├── core/          # errors, values, query options, cache, transaction, store
//! ├── backends/      # SqlDatabase plus the SQLite and PostgreSQL adapters
//! ├── migration/     # script sources, migrator, migration/seed orchestrator
//! └── lib.rs
//! ```

/// Core types and traits
pub mod core;

/// Database backend implementations
pub mod backends;

/// Schema migrations and seed data
pub mod migration;

/// Prelude for convenient imports
///
/// ```rust
/// use rust_ark::prelude::*;
///
/// let options = QueryOptions::new().where_eq("id", 1i64);
/// let record = Record::new().set("name", "Alice");
/// assert_eq!(record.len(), 1);
/// # let _ = options;
/// ```
pub mod prelude {
    pub use crate::core::{
        Database, DatabaseConfig, DatabaseError, DatabaseResult, DatabaseRow, DatabaseValue,
        Dialect, MemoryCache, OrderDirection, QueryOptions, Record, Result, Store, Txn,
        TxnState, ViewCache,
    };

    pub use crate::backends::SqlDatabase;
}

// Re-export at root level for convenience
pub use core::{
    DatabaseConfig, DatabaseError, DatabaseResult, DatabaseRow, DatabaseValue, Dialect,
    QueryOptions, Record, Result, Store, Txn,
};

pub use backends::SqlDatabase;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prelude_imports() {
        use prelude::*;

        let dialect: Dialect = "sqlite".parse().unwrap();
        assert_eq!(dialect.to_str(), "sqlite");
        assert_eq!(dialect.placeholder().token(), "?");
    }

    #[test]
    fn test_value_conversions() {
        use prelude::*;

        let val: DatabaseValue = 42i64.into();
        assert_eq!(val.as_long(), Some(42));

        let val: DatabaseValue = "test".into();
        assert_eq!(val.as_str(), Some("test"));

        let val: DatabaseValue = true.into();
        assert_eq!(val.as_bool(), Some(true));
    }
}
