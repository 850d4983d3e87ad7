//! SQLite backend
//!
//! Connections are pooled with deadpool; every rusqlite call runs on the blocking pool
//! through `interact` and is bounded by the configured operation timeout.
//!
//! Accepted URLs:
//!
//! - `sqlite://localhost/abs/path.db`
//! - `sqlite:///abs/path.db`
//! - `sqlite::memory:` (a single shared connection)

use crate::core::{
    config::DatabaseConfig,
    database::{Backend, UnitOfWork},
    dialect::Dialect,
    error::{DatabaseError, Result},
    value::{DatabaseResult, DatabaseRow, DatabaseValue},
};
use async_trait::async_trait;
use deadpool_sqlite::{Config, Object, Pool, PoolConfig, Runtime};
use rusqlite::{params_from_iter, Row};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Where a SQLite URL points
#[derive(Debug, Clone, PartialEq, Eq)]
enum Location {
    Memory,
    File(PathBuf),
}

fn location(url: &Url) -> Result<Location> {
    if url.scheme() != "sqlite" && url.scheme() != "sqlite3" {
        return Err(DatabaseError::InvalidConnectionString(format!(
            "expected a sqlite:// URL, got {}",
            url
        )));
    }

    if url.path() == ":memory:" || url.path() == "/:memory:" {
        return Ok(Location::Memory);
    }

    url.to_file_path().map(Location::File).map_err(|_| {
        DatabaseError::InvalidConnectionString(format!("no database path in {}", url))
    })
}

/// Convert a rusqlite Row to a DatabaseRow
fn row_to_database_row(row: &Row) -> rusqlite::Result<DatabaseRow> {
    let mut db_row = DatabaseRow::new();
    let column_count = row.as_ref().column_count();

    for i in 0..column_count {
        let column_name = row.as_ref().column_name(i)?.to_string();
        let value = match row.get_ref(i)? {
            rusqlite::types::ValueRef::Null => DatabaseValue::Null,
            rusqlite::types::ValueRef::Integer(v) => DatabaseValue::Long(v),
            rusqlite::types::ValueRef::Real(v) => DatabaseValue::Double(v),
            rusqlite::types::ValueRef::Text(v) => {
                DatabaseValue::String(String::from_utf8_lossy(v).to_string())
            }
            rusqlite::types::ValueRef::Blob(v) => DatabaseValue::Bytes(v.to_vec()),
        };
        db_row.insert(column_name, value);
    }

    Ok(db_row)
}

/// Convert DatabaseValue to rusqlite parameter
fn value_to_param(value: &DatabaseValue) -> Box<dyn rusqlite::ToSql> {
    match value {
        DatabaseValue::Null => Box::new(None::<i64>),
        DatabaseValue::Bool(v) => Box::new(*v),
        DatabaseValue::Int(v) => Box::new(*v),
        DatabaseValue::Long(v) => Box::new(*v),
        DatabaseValue::Float(v) => Box::new(f64::from(*v)),
        DatabaseValue::Double(v) => Box::new(*v),
        DatabaseValue::String(v) => Box::new(v.clone()),
        DatabaseValue::Bytes(v) => Box::new(v.clone()),
        DatabaseValue::Timestamp(v) => Box::new(*v),
    }
}

fn timeout_ms(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

/// Run a blocking closure on a pooled connection, bounded by `timeout`
async fn interact<T, F>(conn: &Object, timeout: Duration, f: F) -> Result<T>
where
    F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::time::timeout(timeout, conn.interact(f))
        .await
        .map_err(|_| DatabaseError::query_timeout(timeout_ms(timeout)))?
        .map_err(|e| DatabaseError::other(format!("Interact error: {}", e)))?
        .map_err(DatabaseError::from)
}

/// Take a connection from the pool, waiting at most `timeout`
async fn checkout(pool: &Pool, timeout: Duration) -> Result<Object> {
    tokio::time::timeout(timeout, pool.get())
        .await
        .map_err(|_| DatabaseError::connection_timeout(timeout_ms(timeout)))?
        .map_err(|e| DatabaseError::connection(format!("Failed to acquire connection: {}", e)))
}

/// Pooled SQLite backend
///
/// # Example
///
/// ```no_run
/// use rust_ark::backends::SqliteBackend;
/// use rust_ark::core::{Backend, DatabaseConfig};
///
/// #[tokio::main]
/// async fn main() -> rust_ark::Result<()> {
///     let url = url::Url::parse("sqlite:///tmp/app.db").unwrap();
///     let backend = SqliteBackend::open(&url, &DatabaseConfig::default()).await?;
///
///     let mut uow = backend.begin(false).await?;
///     uow.exec_batch("CREATE TABLE IF NOT EXISTS users (id INTEGER PRIMARY KEY)").await?;
///     uow.commit().await?;
///     Ok(())
/// }
/// ```
pub struct SqliteBackend {
    pool: Pool,
    url: Url,
    operation_timeout: Duration,
}

impl SqliteBackend {
    /// Open a pool for a `sqlite://` URL
    ///
    /// # Errors
    ///
    /// Returns error if the URL has no database path, or the pool cannot be created or
    /// initialized
    pub async fn open(url: &Url, config: &DatabaseConfig) -> Result<Self> {
        let location = location(url)?;
        let operation_timeout = config.operation_timeout();

        // every in-memory connection is its own database, so share exactly one
        let (path, max_size) = match &location {
            Location::Memory => (PathBuf::from(":memory:"), 1),
            Location::File(path) => (path.clone(), config.max_connections.max(1)),
        };

        let mut pool_config = Config::new(path);
        pool_config.pool = Some(PoolConfig::new(max_size));

        let pool = pool_config
            .create_pool(Runtime::Tokio1)
            .map_err(|e| DatabaseError::connection(format!("Failed to create pool: {}", e)))?;

        let conn = checkout(&pool, operation_timeout).await?;

        if location != Location::Memory {
            interact(&conn, operation_timeout, |conn| {
                // PRAGMA journal_mode returns a value, so we need to use query_row
                conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))
            })
            .await?;
        }

        tracing::debug!(url = %url, max_size, "sqlite pool ready");

        Ok(Self {
            pool,
            url: url.clone(),
            operation_timeout,
        })
    }

    async fn acquire(&self) -> Result<Object> {
        checkout(&self.pool, self.operation_timeout).await
    }
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.pool.status();
        f.debug_struct("SqliteBackend")
            .field("url", &self.url.as_str())
            .field("size", &status.size)
            .field("available", &status.available)
            .finish()
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn url(&self) -> &Url {
        &self.url
    }

    async fn ping(&self) -> Result<()> {
        let conn = self.acquire().await?;
        interact(&conn, self.operation_timeout, |conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))
        })
        .await
    }

    async fn begin(&self, read_only: bool) -> Result<Box<dyn UnitOfWork>> {
        let conn = self.acquire().await?;
        let busy_timeout = self.operation_timeout;

        interact(&conn, self.operation_timeout, move |conn| {
            conn.busy_timeout(busy_timeout)?;
            // foreign_keys is a no-op inside a transaction, so it goes first
            conn.pragma_update(None, "foreign_keys", true)?;
            conn.pragma_update(None, "query_only", read_only)?;
            conn.execute_batch(if read_only {
                "BEGIN DEFERRED"
            } else {
                "BEGIN IMMEDIATE"
            })
        })
        .await?;

        Ok(Box::new(SqliteUnitOfWork {
            conn: Some(conn),
            operation_timeout: self.operation_timeout,
        }))
    }
}

const COMMIT: &str = "COMMIT; PRAGMA query_only = OFF";
const ROLLBACK: &str = "ROLLBACK; PRAGMA query_only = OFF";

/// Transaction holding one pooled connection
///
/// The connection returns to the pool on commit or rollback. If the unit of work is
/// dropped unfinished, a rollback is queued on the runtime; without a runtime the
/// connection is detached from the pool and closed, which rolls back.
struct SqliteUnitOfWork {
    conn: Option<Object>,
    operation_timeout: Duration,
}

impl SqliteUnitOfWork {
    fn conn(&self) -> Result<&Object> {
        self.conn
            .as_ref()
            .ok_or_else(|| DatabaseError::transaction("Transaction already finalized"))
    }

    async fn finish(mut self: Box<Self>, sql: &'static str) -> Result<()> {
        let conn = self
            .conn
            .take()
            .ok_or_else(|| DatabaseError::transaction("Transaction connection missing"))?;

        let result = interact(&conn, self.operation_timeout, move |conn| {
            conn.execute_batch(sql)
        })
        .await;

        if result.is_err() {
            // the connection state is unknown; keep it out of the pool
            drop(Object::take(conn));
        }
        result
    }
}

#[async_trait]
impl UnitOfWork for SqliteUnitOfWork {
    async fn query(&mut self, sql: &str, params: &[DatabaseValue]) -> Result<DatabaseResult> {
        let sql = sql.to_string();
        let params = params.to_vec();

        interact(self.conn()?, self.operation_timeout, move |conn| {
            let rusqlite_params: Vec<Box<dyn rusqlite::ToSql>> =
                params.iter().map(value_to_param).collect();

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                params_from_iter(rusqlite_params.iter()),
                row_to_database_row,
            )?;

            let mut results = Vec::new();
            for row_result in rows {
                results.push(row_result?);
            }
            Ok(results)
        })
        .await
    }

    async fn exec(&mut self, sql: &str, params: &[DatabaseValue]) -> Result<u64> {
        let sql = sql.to_string();
        let params = params.to_vec();

        let affected = interact(self.conn()?, self.operation_timeout, move |conn| {
            let rusqlite_params: Vec<Box<dyn rusqlite::ToSql>> =
                params.iter().map(value_to_param).collect();

            let mut stmt = conn.prepare(&sql)?;
            stmt.execute(params_from_iter(rusqlite_params.iter()))
        })
        .await?;

        Ok(affected as u64)
    }

    async fn exec_batch(&mut self, script: &str) -> Result<()> {
        let script = script.to_string();
        interact(self.conn()?, self.operation_timeout, move |conn| {
            conn.execute_batch(&script)
        })
        .await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.finish(COMMIT).await
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.finish(ROLLBACK).await
    }
}

impl Drop for SqliteUnitOfWork {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let timeout = self.operation_timeout;
                handle.spawn(async move {
                    if let Err(e) = interact(&conn, timeout, |conn| conn.execute_batch(ROLLBACK)).await
                    {
                        tracing::warn!(error = %e, "rollback of abandoned transaction failed");
                        drop(Object::take(conn));
                    }
                });
            }
            Err(_) => drop(Object::take(conn)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory() -> SqliteBackend {
        let url = Url::parse("sqlite::memory:").unwrap();
        SqliteBackend::open(&url, &DatabaseConfig::default())
            .await
            .unwrap()
    }

    #[test]
    fn test_location() {
        let url = Url::parse("sqlite::memory:").unwrap();
        assert_eq!(location(&url).unwrap(), Location::Memory);

        let url = Url::parse("sqlite://localhost/tmp/app.db").unwrap();
        assert_eq!(
            location(&url).unwrap(),
            Location::File(PathBuf::from("/tmp/app.db"))
        );

        let url = Url::parse("sqlite:///tmp/app.db").unwrap();
        assert_eq!(
            location(&url).unwrap(),
            Location::File(PathBuf::from("/tmp/app.db"))
        );

        let url = Url::parse("sqlite://remote.example.com/tmp/app.db").unwrap();
        assert!(location(&url).is_err());

        let url = Url::parse("postgres://localhost/app").unwrap();
        assert!(location(&url).is_err());
    }

    #[tokio::test]
    async fn test_ping() {
        assert!(memory().await.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_commit_and_rollback() -> Result<()> {
        let backend = memory().await;

        let mut uow = backend.begin(false).await?;
        uow.exec_batch("CREATE TABLE test (id INTEGER PRIMARY KEY, name TEXT)")
            .await?;
        uow.exec(
            "INSERT INTO test (name) VALUES (?)",
            &[DatabaseValue::from("Alice")],
        )
        .await?;
        uow.commit().await?;

        let mut uow = backend.begin(false).await?;
        uow.exec(
            "INSERT INTO test (name) VALUES (?)",
            &[DatabaseValue::from("Bob")],
        )
        .await?;
        uow.rollback().await?;

        let mut uow = backend.begin(true).await?;
        let rows = uow.query("SELECT name FROM test", &[]).await?;
        uow.commit().await?;

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], DatabaseValue::from("Alice"));
        Ok(())
    }

    #[tokio::test]
    async fn test_read_only_rejects_writes() -> Result<()> {
        let backend = memory().await;

        let mut uow = backend.begin(false).await?;
        uow.exec_batch("CREATE TABLE test (id INTEGER PRIMARY KEY)")
            .await?;
        uow.commit().await?;

        let mut uow = backend.begin(true).await?;
        assert!(uow.exec("INSERT INTO test (id) VALUES (1)", &[]).await.is_err());
        uow.rollback().await?;

        // the connection is writable again once returned to the pool
        let mut uow = backend.begin(false).await?;
        assert_eq!(uow.exec("INSERT INTO test (id) VALUES (1)", &[]).await?, 1);
        uow.commit().await
    }

    #[tokio::test]
    async fn test_constraint_violation_is_conflict() -> Result<()> {
        let backend = memory().await;

        let mut uow = backend.begin(false).await?;
        uow.exec_batch("CREATE TABLE test (id INTEGER PRIMARY KEY)")
            .await?;
        uow.exec("INSERT INTO test (id) VALUES (1)", &[]).await?;
        let err = uow
            .exec("INSERT INTO test (id) VALUES (1)", &[])
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        uow.rollback().await
    }

    #[tokio::test]
    async fn test_dropped_unit_of_work_rolls_back() -> Result<()> {
        let backend = memory().await;

        let mut uow = backend.begin(false).await?;
        uow.exec_batch("CREATE TABLE test (id INTEGER PRIMARY KEY)")
            .await?;
        uow.commit().await?;

        let mut uow = backend.begin(false).await?;
        uow.exec("INSERT INTO test (id) VALUES (1)", &[]).await?;
        drop(uow);

        // waits for the queued rollback to release the single connection
        let mut uow = backend.begin(true).await?;
        let rows = uow.query("SELECT id FROM test", &[]).await?;
        uow.commit().await?;
        assert!(rows.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_file_database_pool() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let url = Url::from_file_path(dir.path().join("pool.db")).unwrap();
        let url = Url::parse(&url.as_str().replacen("file:", "sqlite:", 1)).unwrap();

        let config = DatabaseConfig::default().with_max_connections(4);
        let backend = SqliteBackend::open(&url, &config).await?;

        let mut uow = backend.begin(false).await?;
        uow.exec_batch("CREATE TABLE test (id INTEGER PRIMARY KEY, name TEXT)")
            .await?;
        uow.commit().await?;

        let backend = std::sync::Arc::new(backend);
        let mut handles = Vec::new();
        for i in 0..8 {
            let backend = std::sync::Arc::clone(&backend);
            handles.push(tokio::spawn(async move {
                let mut uow = backend.begin(false).await?;
                uow.exec(
                    "INSERT INTO test (name) VALUES (?)",
                    &[DatabaseValue::String(format!("user{}", i))],
                )
                .await?;
                uow.commit().await
            }));
        }
        for handle in handles {
            handle.await.unwrap()?;
        }

        let mut uow = backend.begin(true).await?;
        let rows = uow.query("SELECT COUNT(*) AS count FROM test", &[]).await?;
        uow.commit().await?;
        assert_eq!(rows[0]["count"], DatabaseValue::Long(8));
        Ok(())
    }

    #[tokio::test]
    async fn test_busy_pool_times_out() -> Result<()> {
        let url = Url::parse("sqlite::memory:").unwrap();
        let config = DatabaseConfig::default().with_operation_timeout(Duration::from_millis(100));
        let backend = SqliteBackend::open(&url, &config).await?;

        let held = backend.begin(false).await?;
        let Err(err) = backend.begin(true).await else {
            panic!("second unit of work acquired the only connection");
        };
        assert!(matches!(
            err,
            DatabaseError::ConnectionTimeout { timeout_ms: 100 }
        ));

        held.rollback().await?;
        let uow = backend.begin(true).await?;
        uow.commit().await
    }
}
