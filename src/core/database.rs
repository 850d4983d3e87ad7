//! Database traits
//!
//! Two layers of contracts live here:
//!
//! - [`Backend`] / [`UnitOfWork`]: the narrow driver contract. Adapters speak SQL in the
//!   backend's own placeholder syntax and nothing else.
//! - [`Database`] / [`DatabaseTxn`]: the table-level contract used by
//!   [`Txn`](super::transaction::Txn). Reads and writes are expressed as a table name plus
//!   [`QueryOptions`].
//!
//! All traits are object safe so that backends can be selected at runtime by dialect.

use super::dialect::Dialect;
use super::error::Result;
use super::placeholder::Placeholder;
use super::query::QueryOptions;
use super::value::{DatabaseResult, DatabaseRow, DatabaseValue, Record};
use async_trait::async_trait;
use url::Url;

/// Driver contract implemented by every backend adapter
#[async_trait]
pub trait Backend: Send + Sync {
    /// SQL dialect spoken by this backend
    fn dialect(&self) -> Dialect;

    /// Positional parameter syntax
    fn placeholder(&self) -> Placeholder {
        self.dialect().placeholder()
    }

    /// URL the backend was opened with
    fn url(&self) -> &Url;

    /// Check that a connection can be acquired and used
    async fn ping(&self) -> Result<()>;

    /// Acquire a connection and begin a transaction on it
    ///
    /// The connection is held by the returned unit of work until it is committed,
    /// rolled back or dropped. Dropping an unfinished unit of work discards its
    /// connection so that the server rolls the transaction back.
    async fn begin(&self, read_only: bool) -> Result<Box<dyn UnitOfWork>>;
}

/// One backend transaction on one connection
#[async_trait]
pub trait UnitOfWork: Send {
    /// Execute a statement that returns rows
    async fn query(&mut self, sql: &str, params: &[DatabaseValue]) -> Result<DatabaseResult>;

    /// Execute a statement and return the number of affected rows
    async fn exec(&mut self, sql: &str, params: &[DatabaseValue]) -> Result<u64>;

    /// Execute a script of one or more statements without parameters
    async fn exec_batch(&mut self, script: &str) -> Result<()>;

    /// Commit the transaction and release the connection
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Roll back the transaction and release the connection
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Table-level database contract
#[async_trait]
pub trait Database: Send + Sync {
    /// SQL dialect of the underlying backend
    fn dialect(&self) -> Dialect;

    /// Check connectivity
    async fn ping(&self) -> Result<()>;

    /// Begin a table-level transaction
    async fn txn(&self, read_only: bool) -> Result<Box<dyn DatabaseTxn>>;
}

/// Table-level transaction
///
/// Empty reads are reported as errors: [`list`](DatabaseTxn::list) returns
/// [`NoResults`](super::DatabaseError::NoResults) and [`get`](DatabaseTxn::get) returns
/// [`NotFound`](super::DatabaseError::NotFound).
#[async_trait]
pub trait DatabaseTxn: Send {
    /// Read every row of `table` matching `options`
    async fn list(&mut self, table: &str, options: &QueryOptions) -> Result<DatabaseResult>;

    /// Read the first row of `table` matching `options`
    async fn get(&mut self, table: &str, options: &QueryOptions) -> Result<DatabaseRow>;

    /// Insert a record
    async fn insert(&mut self, table: &str, record: &Record) -> Result<u64>;

    /// Update rows matching `options`
    async fn update(&mut self, table: &str, options: &QueryOptions, record: &Record)
        -> Result<u64>;

    /// Delete rows matching `options`
    async fn remove(&mut self, table: &str, options: &QueryOptions) -> Result<u64>;

    /// Execute raw SQL written with `?` placeholders
    async fn exec(&mut self, sql: &str, params: &[DatabaseValue]) -> Result<u64>;

    /// Commit
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Roll back
    async fn rollback(self: Box<Self>) -> Result<()>;
}
