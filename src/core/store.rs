//! Store: the entry point handing out transactions

use super::cache::{MemoryCache, ViewCache};
use super::config::DatabaseConfig;
use super::database::Database;
use super::dialect::Dialect;
use super::error::Result;
use super::transaction::{Txn, TxnState};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Default capacity of a transaction's pending-view queue
pub const DEFAULT_BATCH_SIZE: usize = 1024;

/// Owns a database, the shared view cache and the read batch size
///
/// Cloning is cheap; clones share the database and the cache.
///
/// # Example
///
/// ```rust,no_run
/// use rust_ark::prelude::*;
///
/// #[tokio::main]
/// async fn main() -> Result<()> {
///     let store = Store::connect("sqlite", "sqlite::memory:", DatabaseConfig::default())
///         .await?
///         .with_batch_size(64);
///
///     let mut tx = store.txn(true).await?;
///     let rows = tx.list("users", &QueryOptions::new().limit(10)).await;
///     tx.commit().await?;
///     # let _ = rows;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Store {
    db: Arc<dyn Database>,
    cache: Arc<dyn ViewCache>,
    batch_size: usize,
}

impl Store {
    /// Wrap a database with an in-memory cache and the default batch size
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self {
            db,
            cache: Arc::new(MemoryCache::new()),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Open a SQL database by dialect and URL, running migrations as configured
    pub async fn connect(dialect: &str, url: &str, config: DatabaseConfig) -> Result<Self> {
        let db = crate::backends::SqlDatabase::connect(dialect, url, &config).await?;
        Ok(Self::new(Arc::new(db)))
    }

    /// Replace the view cache
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn ViewCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Set the pending-view capacity of each transaction (at least 1)
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Dialect of the underlying database
    pub fn dialect(&self) -> Dialect {
        self.db.dialect()
    }

    /// Pending-view capacity of each transaction
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// The shared view cache
    pub fn cache(&self) -> &Arc<dyn ViewCache> {
        &self.cache
    }

    /// Check connectivity
    pub async fn ping(&self) -> Result<()> {
        self.db.ping().await
    }

    /// Begin a transaction
    pub async fn txn(&self, read_only: bool) -> Result<Txn> {
        let inner = self.db.txn(read_only).await?;
        Ok(Txn::new(inner, Arc::clone(&self.cache), self.batch_size))
    }

    /// Run `f` in a transaction, committing on `Ok` and rolling back on `Err`
    ///
    /// ```rust,no_run
    /// use rust_ark::prelude::*;
    ///
    /// # async fn example(store: Store) -> Result<()> {
    /// let count = store
    ///     .transaction(false, |tx| {
    ///         Box::pin(async move {
    ///             tx.insert("users", &Record::new().set("name", "Alice")).await?;
    ///             Ok(tx.list("users", &QueryOptions::new()).await?.len())
    ///         })
    ///     })
    ///     .await?;
    /// # let _ = count;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn transaction<F, T>(&self, read_only: bool, f: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut Txn) -> Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>
            + Send,
        T: Send,
    {
        let mut tx = self.txn(read_only).await?;

        match f(&mut tx).await {
            Ok(value) => {
                if tx.state() == TxnState::Open {
                    tx.commit().await?;
                }
                Ok(value)
            }
            Err(e) => {
                if tx.state() == TxnState::Open {
                    if let Err(rollback_err) = tx.rollback().await {
                        tracing::warn!(error = %rollback_err, "rollback after failed transaction");
                    }
                }
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("dialect", &self.db.dialect())
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::database::DatabaseTxn;
    use crate::core::error::DatabaseError;
    use crate::core::query::QueryOptions;
    use crate::core::value::{DatabaseResult, DatabaseRow, DatabaseValue, Record};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// In-memory database: one table of rows, writes staged until commit
    #[derive(Default)]
    struct FakeDb {
        rows: Arc<Mutex<Vec<DatabaseRow>>>,
    }

    struct FakeTxn {
        rows: Arc<Mutex<Vec<DatabaseRow>>>,
        staged: Vec<DatabaseRow>,
    }

    #[async_trait]
    impl Database for FakeDb {
        fn dialect(&self) -> Dialect {
            Dialect::Sqlite
        }

        async fn ping(&self) -> Result<()> {
            Ok(())
        }

        async fn txn(&self, _read_only: bool) -> Result<Box<dyn DatabaseTxn>> {
            Ok(Box::new(FakeTxn {
                rows: Arc::clone(&self.rows),
                staged: Vec::new(),
            }))
        }
    }

    #[async_trait]
    impl DatabaseTxn for FakeTxn {
        async fn list(&mut self, _table: &str, _options: &QueryOptions) -> Result<DatabaseResult> {
            let mut rows = self.rows.lock().clone();
            rows.extend(self.staged.iter().cloned());
            if rows.is_empty() {
                return Err(DatabaseError::NoResults);
            }
            Ok(rows)
        }

        async fn get(&mut self, table: &str, options: &QueryOptions) -> Result<DatabaseRow> {
            match self.list(table, options).await {
                Ok(rows) => rows.into_iter().next().ok_or(DatabaseError::NotFound),
                Err(DatabaseError::NoResults) => Err(DatabaseError::NotFound),
                Err(e) => Err(e),
            }
        }

        async fn insert(&mut self, _table: &str, record: &Record) -> Result<u64> {
            let row = record
                .columns()
                .iter()
                .cloned()
                .zip(record.values().iter().cloned())
                .collect();
            self.staged.push(row);
            Ok(1)
        }

        async fn update(
            &mut self,
            _table: &str,
            _options: &QueryOptions,
            _record: &Record,
        ) -> Result<u64> {
            Err(DatabaseError::unsupported("update"))
        }

        async fn remove(&mut self, _table: &str, _options: &QueryOptions) -> Result<u64> {
            Err(DatabaseError::unsupported("remove"))
        }

        async fn exec(&mut self, _sql: &str, _params: &[DatabaseValue]) -> Result<u64> {
            Ok(0)
        }

        async fn commit(self: Box<Self>) -> Result<()> {
            self.rows.lock().extend(self.staged);
            Ok(())
        }

        async fn rollback(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    fn store() -> (Store, Arc<Mutex<Vec<DatabaseRow>>>) {
        let db = FakeDb::default();
        let rows = Arc::clone(&db.rows);
        (Store::new(Arc::new(db)), rows)
    }

    #[tokio::test]
    async fn test_transaction_commits_on_ok() {
        let (store, rows) = store();

        let count = store
            .transaction(false, |tx| {
                Box::pin(async move {
                    tx.insert("users", &Record::new().set("name", "alice"))
                        .await?;
                    Ok(tx.list("users", &QueryOptions::new()).await?.len())
                })
            })
            .await
            .unwrap();

        assert_eq!(count, 1);
        assert_eq!(rows.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_transaction_rolls_back_on_err() {
        let (store, rows) = store();

        let result: Result<()> = store
            .transaction(false, |tx| {
                Box::pin(async move {
                    tx.insert("users", &Record::new().set("name", "alice"))
                        .await?;
                    Err(DatabaseError::other("abort"))
                })
            })
            .await;

        assert!(result.is_err());
        assert!(rows.lock().is_empty());
    }

    #[tokio::test]
    async fn test_transaction_tolerates_explicit_commit() {
        let (store, rows) = store();

        store
            .transaction(false, |tx| {
                Box::pin(async move {
                    tx.insert("users", &Record::new().set("name", "alice"))
                        .await?;
                    tx.commit().await
                })
            })
            .await
            .unwrap();

        assert_eq!(rows.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_committed_reads_are_cached() {
        let (store, rows) = store();
        rows.lock().push(
            [("name".to_string(), DatabaseValue::from("alice"))]
                .into_iter()
                .collect(),
        );

        let mut tx = store.txn(true).await.unwrap();
        tx.list("users", &QueryOptions::new()).await.unwrap();
        tx.commit().await.unwrap();

        // the backing rows change, the cached view does not
        rows.lock().clear();
        let mut tx = store.txn(true).await.unwrap();
        let cached = tx.list("users", &QueryOptions::new()).await.unwrap();
        assert_eq!(cached.len(), 1);
        tx.commit().await.unwrap();
    }

    #[test]
    fn test_batch_size_clamped() {
        let (store, _) = store();
        assert_eq!(store.batch_size(), DEFAULT_BATCH_SIZE);
        assert_eq!(store.with_batch_size(0).batch_size(), 1);
    }
}
