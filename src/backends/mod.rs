//! Database backend implementations
//!
//! Each adapter implements the narrow [`Backend`] contract. [`SqlDatabase`] sits on top
//! of any of them and provides the table-level [`Database`] contract used by
//! transactions.

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub use postgres::PostgresBackend;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;

use crate::core::{
    config::DatabaseConfig,
    database::{Backend, Database, DatabaseTxn, UnitOfWork},
    dialect::Dialect,
    error::{DatabaseError, Result},
    placeholder::Placeholder,
    query::{insert_sql, QueryOptions},
    value::{DatabaseResult, DatabaseRow, DatabaseValue, Record},
};
use crate::migration::{is_local_host, MigrationReport, Orchestrator, SqlMigrator};
use async_trait::async_trait;
use std::sync::Arc;
use url::Url;

/// Open the adapter serving `dialect`
async fn open_backend(
    dialect: Dialect,
    url: &Url,
    config: &DatabaseConfig,
) -> Result<Arc<dyn Backend>> {
    match dialect {
        #[cfg(feature = "sqlite")]
        Dialect::Sqlite => Ok(Arc::new(SqliteBackend::open(url, config).await?)),
        #[cfg(feature = "postgres")]
        Dialect::Postgres | Dialect::Redshift => {
            Ok(Arc::new(PostgresBackend::open(dialect, url, config).await?))
        }
        #[allow(unreachable_patterns)]
        other => Err(DatabaseError::unsupported(format!(
            "{} support is not compiled in",
            other
        ))),
    }
}

/// Whether seeds may be applied to the database behind `url`
///
/// Embedded SQLite databases have no host and always count as local.
fn is_local(dialect: Dialect, url: &Url) -> bool {
    match url.host_str().filter(|host| !host.is_empty()) {
        Some(host) => is_local_host(host),
        None => dialect == Dialect::Sqlite,
    }
}

/// Table-level database over a SQL [`Backend`]
///
/// # Example
///
/// ```rust,no_run
/// use rust_ark::backends::SqlDatabase;
/// use rust_ark::core::{Database, DatabaseConfig};
/// use rust_ark::migration::FsSource;
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> rust_ark::Result<()> {
///     let config = DatabaseConfig::new()
///         .with_migration_source(Arc::new(FsSource::new("db")))
///         .with_migration_directory("migrations")
///         .with_seed_directory("seeds");
///
///     let db = SqlDatabase::connect("sqlite", "sqlite://localhost/tmp/app.db", &config).await?;
///     db.ping().await?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct SqlDatabase {
    backend: Arc<dyn Backend>,
}

impl SqlDatabase {
    /// Select the adapter for `dialect`, open `url` and run the configured migrations
    ///
    /// Migrations run only when both a migration source and a migration directory are
    /// configured. Seeds are applied only on local hosts.
    ///
    /// # Errors
    ///
    /// - [`DatabaseError::UnrecognizedDialect`] for an unknown dialect
    /// - [`DatabaseError::InvalidConnectionString`] for an unparsable URL
    /// - [`DatabaseError::Migration`] when the migration run fails; everything it
    ///   applied has been reverted by then
    pub async fn connect(dialect: &str, url: &str, config: &DatabaseConfig) -> Result<Self> {
        let dialect: Dialect = dialect.parse()?;
        let url = Url::parse(url)
            .map_err(|e| DatabaseError::InvalidConnectionString(format!("{}: {}", url, e)))?;

        let backend = open_backend(dialect, &url, config).await?;
        let db = Self::with_backend(backend);
        db.migrate(config).await?;
        Ok(db)
    }

    /// Wrap an already opened backend without running migrations
    pub fn with_backend(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// The underlying backend
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Run the migration orchestrator as configured
    ///
    /// Returns an empty report when no migration source or directory is configured.
    pub async fn migrate(&self, config: &DatabaseConfig) -> Result<MigrationReport> {
        let (Some(source), Some(dir)) = (
            config.migration_source.clone(),
            config.migration_directory.as_deref(),
        ) else {
            tracing::debug!("no migration source configured; skipping migrations");
            return Ok(MigrationReport::default());
        };

        let dialect = self.backend.dialect();
        let url = self.backend.url();
        let local = is_local(dialect, url);

        let migrator = SqlMigrator::new(Arc::clone(&self.backend), Arc::clone(&source))
            .with_table(config.migration_table.clone());

        let mut orchestrator = Orchestrator::new(Arc::new(migrator), source, dir)
            .with_local(local)
            .with_span(tracing::info_span!(
                "migration_run",
                dialect = %dialect,
                host = url.host_str().unwrap_or(""),
                local,
            ));
        if let Some(seeds) = config.seed_directory.as_deref() {
            orchestrator = orchestrator.with_seed_directory(seeds);
        }

        orchestrator.run().await
    }
}

impl std::fmt::Debug for SqlDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlDatabase")
            .field("dialect", &self.backend.dialect())
            .finish()
    }
}

#[async_trait]
impl Database for SqlDatabase {
    fn dialect(&self) -> Dialect {
        self.backend.dialect()
    }

    async fn ping(&self) -> Result<()> {
        self.backend.ping().await
    }

    async fn txn(&self, read_only: bool) -> Result<Box<dyn DatabaseTxn>> {
        let uow = self.backend.begin(read_only).await?;
        Ok(Box::new(SqlTxn {
            uow,
            placeholder: self.backend.placeholder(),
        }))
    }
}

/// Renders table-level operations into SQL on one backend transaction
struct SqlTxn {
    uow: Box<dyn UnitOfWork>,
    placeholder: Placeholder,
}

impl SqlTxn {
    async fn query(&mut self, sql: &str, params: &[DatabaseValue]) -> Result<DatabaseResult> {
        let sql = self.placeholder.rewrite(sql);
        tracing::trace!(sql = %sql, params = params.len(), "query");
        self.uow.query(&sql, params).await
    }

    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> Result<u64> {
        let sql = self.placeholder.rewrite(sql);
        tracing::trace!(sql = %sql, params = params.len(), "exec");
        self.uow.exec(&sql, params).await
    }
}

#[async_trait]
impl DatabaseTxn for SqlTxn {
    async fn list(&mut self, table: &str, options: &QueryOptions) -> Result<DatabaseResult> {
        let (sql, params) = options.select_sql(table);
        let rows = self.query(&sql, &params).await?;
        if rows.is_empty() {
            return Err(DatabaseError::NoResults);
        }
        Ok(rows)
    }

    async fn get(&mut self, table: &str, options: &QueryOptions) -> Result<DatabaseRow> {
        let (sql, params) = options.first().select_sql(table);
        self.query(&sql, &params)
            .await?
            .into_iter()
            .next()
            .ok_or(DatabaseError::NotFound)
    }

    async fn insert(&mut self, table: &str, record: &Record) -> Result<u64> {
        let (sql, params) = insert_sql(table, record)?;
        self.execute(&sql, &params).await
    }

    async fn update(
        &mut self,
        table: &str,
        options: &QueryOptions,
        record: &Record,
    ) -> Result<u64> {
        let (sql, params) = options.update_sql(table, record)?;
        self.execute(&sql, &params).await
    }

    async fn remove(&mut self, table: &str, options: &QueryOptions) -> Result<u64> {
        let (sql, params) = options.delete_sql(table);
        self.execute(&sql, &params).await
    }

    async fn exec(&mut self, sql: &str, params: &[DatabaseValue]) -> Result<u64> {
        self.execute(sql, params).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.uow.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.uow.rollback().await
    }
}
