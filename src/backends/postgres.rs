//! PostgreSQL and Redshift backend
//!
//! Connections are pooled with deadpool-postgres. Redshift speaks the PostgreSQL wire
//! protocol and is served by the same adapter.

use crate::core::{
    config::DatabaseConfig,
    database::{Backend, UnitOfWork},
    dialect::Dialect,
    error::{DatabaseError, Result},
    value::{DatabaseResult, DatabaseRow, DatabaseValue},
};
use async_trait::async_trait;
use deadpool_postgres::{Config, Object, Pool, PoolConfig, Runtime};
use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};
use url::Url;

fn timeout_ms(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

/// Await a driver future, bounded by `timeout`
async fn bounded<T, F>(timeout: Duration, future: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, tokio_postgres::Error>>,
{
    tokio::time::timeout(timeout, future)
        .await
        .map_err(|_| DatabaseError::query_timeout(timeout_ms(timeout)))?
        .map_err(DatabaseError::from)
}

fn micros_to_system_time(micros: i64) -> SystemTime {
    let offset = Duration::from_micros(micros.unsigned_abs());
    if micros >= 0 {
        UNIX_EPOCH + offset
    } else {
        UNIX_EPOCH - offset
    }
}

fn system_time_to_micros(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_micros()).unwrap_or(i64::MAX),
        Err(e) => -i64::try_from(e.duration().as_micros()).unwrap_or(i64::MAX),
    }
}

/// Convert a tokio_postgres Row to a DatabaseRow
fn row_to_database_row(row: &Row) -> Result<DatabaseRow> {
    let mut db_row = DatabaseRow::new();

    for (idx, column) in row.columns().iter().enumerate() {
        let column_name = column.name().to_string();
        let value = match column.type_().name() {
            "bool" => row
                .try_get::<_, Option<bool>>(idx)?
                .map(DatabaseValue::Bool),
            "int2" => row
                .try_get::<_, Option<i16>>(idx)?
                .map(|v| DatabaseValue::Int(i32::from(v))),
            "int4" => row.try_get::<_, Option<i32>>(idx)?.map(DatabaseValue::Int),
            "int8" => row.try_get::<_, Option<i64>>(idx)?.map(DatabaseValue::Long),
            "float4" => row
                .try_get::<_, Option<f32>>(idx)?
                .map(DatabaseValue::Float),
            "float8" => row
                .try_get::<_, Option<f64>>(idx)?
                .map(DatabaseValue::Double),
            "text" | "varchar" | "char" | "bpchar" | "name" => row
                .try_get::<_, Option<String>>(idx)?
                .map(DatabaseValue::String),
            "bytea" => row
                .try_get::<_, Option<Vec<u8>>>(idx)?
                .map(DatabaseValue::Bytes),
            "timestamp" | "timestamptz" => row
                .try_get::<_, Option<SystemTime>>(idx)?
                .map(|t| DatabaseValue::Timestamp(system_time_to_micros(t))),
            // anything else is read as text when the driver allows it
            _ => row
                .try_get::<_, Option<String>>(idx)
                .ok()
                .flatten()
                .map(DatabaseValue::String),
        };
        db_row.insert(column_name, value.unwrap_or(DatabaseValue::Null));
    }

    Ok(db_row)
}

/// Convert DatabaseValue to postgres parameter
fn value_to_param(value: &DatabaseValue) -> Box<dyn ToSql + Sync + Send> {
    match value {
        DatabaseValue::Null => Box::new(None::<i64>),
        DatabaseValue::Bool(v) => Box::new(*v),
        DatabaseValue::Int(v) => Box::new(*v),
        DatabaseValue::Long(v) => Box::new(*v),
        DatabaseValue::Float(v) => Box::new(*v),
        DatabaseValue::Double(v) => Box::new(*v),
        DatabaseValue::String(v) => Box::new(v.clone()),
        DatabaseValue::Bytes(v) => Box::new(v.clone()),
        DatabaseValue::Timestamp(v) => Box::new(micros_to_system_time(*v)),
    }
}

/// Pooled PostgreSQL backend
pub struct PostgresBackend {
    pool: Pool,
    url: Url,
    dialect: Dialect,
    operation_timeout: Duration,
}

impl PostgresBackend {
    /// Open a pool for a `postgres://` (or `redshift://`) URL
    ///
    /// A `redshift` scheme is rewritten to `postgres` before it reaches the driver.
    ///
    /// # Errors
    ///
    /// Returns error if the URL is not a PostgreSQL URL or no connection can be made
    pub async fn open(dialect: Dialect, url: &Url, config: &DatabaseConfig) -> Result<Self> {
        if !dialect.is_postgres_family() {
            return Err(DatabaseError::unsupported(format!(
                "{} is not served by the postgres backend",
                dialect
            )));
        }

        let conn_str = match url.scheme() {
            "postgres" | "postgresql" => url.to_string(),
            "redshift" => url.as_str().replacen("redshift", "postgres", 1),
            other => {
                return Err(DatabaseError::InvalidConnectionString(format!(
                    "unexpected scheme '{}' for {}",
                    other, dialect
                )))
            }
        };

        let pool_config = Config {
            url: Some(conn_str),
            pool: Some(PoolConfig::new(config.max_connections.max(1))),
            ..Config::default()
        };

        let pool = pool_config
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| DatabaseError::connection(format!("Failed to create pool: {}", e)))?;

        let backend = Self {
            pool,
            url: url.clone(),
            dialect,
            operation_timeout: config.operation_timeout(),
        };

        // fail fast on bad credentials or an unreachable host
        tokio::time::timeout(backend.operation_timeout, backend.ping())
            .await
            .map_err(|_| DatabaseError::connection_timeout(timeout_ms(backend.operation_timeout)))??;

        tracing::debug!(dialect = %dialect, host = ?url.host_str(), "postgres pool ready");
        Ok(backend)
    }

    async fn acquire(&self) -> Result<Object> {
        tokio::time::timeout(self.operation_timeout, self.pool.get())
            .await
            .map_err(|_| DatabaseError::connection_timeout(timeout_ms(self.operation_timeout)))?
            .map_err(|e| DatabaseError::connection(format!("Failed to acquire connection: {}", e)))
    }
}

impl std::fmt::Debug for PostgresBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.pool.status();
        f.debug_struct("PostgresBackend")
            .field("dialect", &self.dialect)
            .field("host", &self.url.host_str())
            .field("size", &status.size)
            .field("available", &status.available)
            .finish()
    }
}

#[async_trait]
impl Backend for PostgresBackend {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn url(&self) -> &Url {
        &self.url
    }

    async fn ping(&self) -> Result<()> {
        let client = self.acquire().await?;
        bounded(self.operation_timeout, client.simple_query("SELECT 1")).await?;
        Ok(())
    }

    async fn begin(&self, read_only: bool) -> Result<Box<dyn UnitOfWork>> {
        let client = self.acquire().await?;
        let begin = if read_only {
            "BEGIN READ ONLY"
        } else {
            "BEGIN READ WRITE"
        };
        bounded(self.operation_timeout, client.batch_execute(begin)).await?;

        Ok(Box::new(PostgresUnitOfWork {
            client: Some(client),
            operation_timeout: self.operation_timeout,
        }))
    }
}

/// Transaction holding one pooled client
///
/// Dropped unfinished, the rollback is queued on the runtime. Without a runtime the
/// client is detached and closed, which makes the server roll back.
struct PostgresUnitOfWork {
    client: Option<Object>,
    operation_timeout: Duration,
}

impl PostgresUnitOfWork {
    fn client(&self) -> Result<&Object> {
        self.client
            .as_ref()
            .ok_or_else(|| DatabaseError::transaction("Transaction already finalized"))
    }

    async fn finish(mut self: Box<Self>, sql: &'static str) -> Result<()> {
        let client = self
            .client
            .take()
            .ok_or_else(|| DatabaseError::transaction("Transaction connection missing"))?;

        let result = bounded(self.operation_timeout, client.batch_execute(sql)).await;
        if result.is_err() {
            drop(Object::take(client));
        }
        result
    }
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn query(&mut self, sql: &str, params: &[DatabaseValue]) -> Result<DatabaseResult> {
        let postgres_params: Vec<Box<dyn ToSql + Sync + Send>> =
            params.iter().map(value_to_param).collect();
        let param_refs: Vec<&(dyn ToSql + Sync)> = postgres_params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let rows = bounded(
            self.operation_timeout,
            self.client()?.query(sql, &param_refs),
        )
        .await?;

        rows.iter().map(row_to_database_row).collect()
    }

    async fn exec(&mut self, sql: &str, params: &[DatabaseValue]) -> Result<u64> {
        let postgres_params: Vec<Box<dyn ToSql + Sync + Send>> =
            params.iter().map(value_to_param).collect();
        let param_refs: Vec<&(dyn ToSql + Sync)> = postgres_params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        bounded(
            self.operation_timeout,
            self.client()?.execute(sql, &param_refs),
        )
        .await
    }

    async fn exec_batch(&mut self, script: &str) -> Result<()> {
        bounded(self.operation_timeout, self.client()?.batch_execute(script)).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.finish("COMMIT").await
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.finish("ROLLBACK").await
    }
}

impl Drop for PostgresUnitOfWork {
    fn drop(&mut self) {
        let Some(client) = self.client.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let timeout = self.operation_timeout;
                handle.spawn(async move {
                    if let Err(e) = bounded(timeout, client.batch_execute("ROLLBACK")).await {
                        tracing::warn!(error = %e, "rollback of abandoned transaction failed");
                        drop(Object::take(client));
                    }
                });
            }
            Err(_) => drop(Object::take(client)),
        }
    }
}
