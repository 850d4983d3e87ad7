//! Unit of work with read-through caching
//!
//! A [`Txn`] wraps one table-level database transaction. Every read consults the shared
//! [`ViewCache`] first; misses go to the database and are remembered as pending views,
//! which are promoted into the cache only when the transaction commits.
//!
//! The first failure is sticky: once an operation fails, every later operation returns a
//! clone of that error without touching the database. [`Txn::rollback`] remains available
//! to end the transaction. Empty reads ([`DatabaseError::NotFound`],
//! [`DatabaseError::NoResults`]) are ordinary outcomes and are not recorded.

use super::cache::ViewCache;
use super::database::DatabaseTxn;
use super::error::{DatabaseError, Result};
use super::query::{QueryOptions, ViewKind};
use super::value::{from_row, from_rows, DatabaseResult, DatabaseRow, DatabaseValue, Record};
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Lifecycle of a [`Txn`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    /// Accepting operations
    Open,
    /// Committed; pending views were promoted
    Committed,
    /// Rolled back; pending views were discarded
    RolledBack,
}

/// A read that has not yet been promoted into the cache
#[derive(Debug)]
struct View {
    table: String,
    key: Vec<u8>,
    rows: Arc<DatabaseResult>,
}

/// Transactional unit of work
///
/// # Example
///
/// ```rust,no_run
/// use rust_ark::prelude::*;
///
/// # async fn example(store: Store) -> Result<()> {
/// let mut tx = store.txn(false).await?;
/// tx.insert("users", &Record::new().set("name", "Alice")).await?;
/// let alice = tx.get("users", &QueryOptions::new().where_eq("name", "Alice")).await?;
/// tx.commit().await?;
/// # let _ = alice;
/// # Ok(())
/// # }
/// ```
pub struct Txn {
    inner: Option<Box<dyn DatabaseTxn>>,
    cache: Arc<dyn ViewCache>,
    views: Vec<View>,
    batch_size: usize,
    state: TxnState,
    err: Option<DatabaseError>,
}

impl Txn {
    /// Wrap a database transaction
    ///
    /// At most `batch_size` reads may miss the cache before the transaction ends.
    pub fn new(inner: Box<dyn DatabaseTxn>, cache: Arc<dyn ViewCache>, batch_size: usize) -> Self {
        Self {
            inner: Some(inner),
            cache,
            views: Vec::with_capacity(batch_size.min(64)),
            batch_size,
            state: TxnState::Open,
            err: None,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> TxnState {
        self.state
    }

    /// The recorded error, if any
    pub fn err(&self) -> Option<&DatabaseError> {
        self.err.as_ref()
    }

    /// Number of reads waiting to be promoted on commit
    pub fn pending_views(&self) -> usize {
        self.views.len()
    }

    fn ready(&self) -> Result<()> {
        match self.state {
            TxnState::Open => {}
            TxnState::Committed => {
                return Err(DatabaseError::transaction("transaction already committed"))
            }
            TxnState::RolledBack => {
                return Err(DatabaseError::transaction("transaction already rolled back"))
            }
        }

        match &self.err {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if err.poisons_transaction() {
                self.err = Some(err.clone());
            }
        }
        result
    }

    fn inner_mut(&mut self) -> Result<&mut (dyn DatabaseTxn + 'static)> {
        self.inner
            .as_deref_mut()
            .ok_or_else(|| DatabaseError::transaction("transaction has no connection"))
    }

    /// Cache lookup; on a miss, reserves a slot in the pending queue or fails
    fn lookup(&mut self, key: &[u8]) -> Result<Option<Arc<DatabaseResult>>> {
        if let Some(hit) = self.cache.get(key) {
            tracing::trace!(key_len = key.len(), "view cache hit");
            return Ok(Some(hit));
        }

        if self.views.len() >= self.batch_size {
            return self.record(Err(DatabaseError::BatchExhausted {
                capacity: self.batch_size,
            }));
        }

        Ok(None)
    }

    /// Read every row of `table` matching `options`
    ///
    /// # Errors
    ///
    /// - [`DatabaseError::NoResults`] when nothing matches
    /// - [`DatabaseError::BatchExhausted`] when the read misses the cache and the pending
    ///   queue is full; the database is not contacted
    pub async fn list(&mut self, table: &str, options: &QueryOptions) -> Result<DatabaseResult> {
        self.ready()?;

        let key = options.fingerprint(ViewKind::List, table);
        if let Some(hit) = self.lookup(&key)? {
            return Ok(hit.as_ref().clone());
        }

        let result = match self.inner_mut() {
            Ok(inner) => inner.list(table, options).await,
            Err(err) => Err(err),
        };
        let rows = self.record(result)?;

        self.views.push(View {
            table: table.to_string(),
            key,
            rows: Arc::new(rows.clone()),
        });
        Ok(rows)
    }

    /// Read the first row of `table` matching `options`
    ///
    /// # Errors
    ///
    /// - [`DatabaseError::NotFound`] when nothing matches
    /// - [`DatabaseError::BatchExhausted`] as for [`list`](Txn::list)
    pub async fn get(&mut self, table: &str, options: &QueryOptions) -> Result<DatabaseRow> {
        self.ready()?;

        let key = options.fingerprint(ViewKind::Get, table);
        if let Some(hit) = self.lookup(&key)? {
            return hit.first().cloned().ok_or(DatabaseError::NotFound);
        }

        let result = match self.inner_mut() {
            Ok(inner) => inner.get(table, options).await,
            Err(err) => Err(err),
        };
        let row = self.record(result)?;

        self.views.push(View {
            table: table.to_string(),
            key,
            rows: Arc::new(vec![row.clone()]),
        });
        Ok(row)
    }

    /// [`list`](Txn::list) deserialized into `T`
    pub async fn list_as<T: DeserializeOwned>(
        &mut self,
        table: &str,
        options: &QueryOptions,
    ) -> Result<Vec<T>> {
        let rows = self.list(table, options).await?;
        let result = from_rows(&rows);
        self.record(result)
    }

    /// [`get`](Txn::get) deserialized into `T`
    pub async fn get_as<T: DeserializeOwned>(
        &mut self,
        table: &str,
        options: &QueryOptions,
    ) -> Result<T> {
        let row = self.get(table, options).await?;
        let result = from_row(&row);
        self.record(result)
    }

    /// Insert a record into `table`
    ///
    /// # Errors
    ///
    /// [`DatabaseError::Conflict`] on an integrity constraint violation
    pub async fn insert(&mut self, table: &str, record: &Record) -> Result<u64> {
        self.ready()?;
        self.forget(Some(table));

        let result = match self.inner_mut() {
            Ok(inner) => inner.insert(table, record).await,
            Err(err) => Err(err),
        };
        self.record(result)
    }

    /// Update rows of `table` matching `options`
    pub async fn update(
        &mut self,
        table: &str,
        options: &QueryOptions,
        record: &Record,
    ) -> Result<u64> {
        self.ready()?;
        self.forget(Some(table));

        let result = match self.inner_mut() {
            Ok(inner) => inner.update(table, options, record).await,
            Err(err) => Err(err),
        };
        self.record(result)
    }

    /// Delete rows of `table` matching `options`
    pub async fn remove(&mut self, table: &str, options: &QueryOptions) -> Result<u64> {
        self.ready()?;
        self.forget(Some(table));

        let result = match self.inner_mut() {
            Ok(inner) => inner.remove(table, options).await,
            Err(err) => Err(err),
        };
        self.record(result)
    }

    /// Execute raw SQL with `?` placeholders
    ///
    /// The statement may touch any table, so every pending view is dropped.
    pub async fn exec(&mut self, sql: &str, params: &[DatabaseValue]) -> Result<u64> {
        self.ready()?;
        self.forget(None);

        let result = match self.inner_mut() {
            Ok(inner) => inner.exec(sql, params).await,
            Err(err) => Err(err),
        };
        self.record(result)
    }

    /// Drop pending views that a write to `table` (or any table) may have made stale
    fn forget(&mut self, table: Option<&str>) {
        match table {
            Some(table) => self.views.retain(|view| view.table != table),
            None => self.views.clear(),
        }
    }

    /// Commit, then promote every pending view into the cache
    ///
    /// # Errors
    ///
    /// Returns the recorded error if an earlier operation failed. The transaction stays
    /// open in that case so it can be rolled back.
    pub async fn commit(&mut self) -> Result<()> {
        self.ready()?;

        let inner = self.inner.take();
        let result = match inner {
            Some(inner) => inner.commit().await,
            None => Err(DatabaseError::transaction("transaction has no connection")),
        };

        if let Err(err) = result {
            // the connection is gone either way
            self.state = TxnState::RolledBack;
            self.views.clear();
            self.err = Some(err.clone());
            return Err(err);
        }

        self.state = TxnState::Committed;
        let promoted = self.views.len();
        for view in self.views.drain(..) {
            self.cache.put(view.key, view.rows);
        }
        tracing::debug!(promoted, "transaction committed");
        Ok(())
    }

    /// Roll back and discard every pending view
    pub async fn rollback(&mut self) -> Result<()> {
        match self.state {
            TxnState::Open => {}
            TxnState::Committed => {
                return Err(DatabaseError::transaction("transaction already committed"))
            }
            TxnState::RolledBack => {
                return Err(DatabaseError::transaction("transaction already rolled back"))
            }
        }

        self.state = TxnState::RolledBack;
        self.views.clear();

        match self.inner.take() {
            Some(inner) => inner.rollback().await,
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Txn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Txn")
            .field("state", &self.state)
            .field("pending_views", &self.views.len())
            .field("batch_size", &self.batch_size)
            .field("err", &self.err)
            .finish()
    }
}

impl Drop for Txn {
    fn drop(&mut self) {
        if self.state == TxnState::Open {
            // dropping the inner transaction discards its connection
            tracing::warn!(
                pending_views = self.views.len(),
                "transaction dropped without commit or rollback; rolling back"
            );
        }
    }
}
