//! Database configuration

use super::error::Result;
use crate::migration::MigrationSource;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Default name of the migration version table
pub const DEFAULT_MIGRATION_TABLE: &str = "schema_migrations";

/// Default pool size for file and network backends
pub const DEFAULT_MAX_CONNECTIONS: usize = 16;

/// Default bound on a single backend call
pub const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 30_000;

fn default_migration_table() -> String {
    DEFAULT_MIGRATION_TABLE.to_string()
}

fn default_max_connections() -> usize {
    DEFAULT_MAX_CONNECTIONS
}

fn default_operation_timeout_ms() -> u64 {
    DEFAULT_OPERATION_TIMEOUT_MS
}

/// Connection and migration settings
///
/// Migrations run when the database is opened, but only if both a
/// [`MigrationSource`] and a migration directory are configured. Seeds are applied only
/// on local hosts (see [`is_local_host`](crate::migration::is_local_host)).
///
/// ```
/// use rust_ark::core::DatabaseConfig;
///
/// let config = DatabaseConfig::from_json(
///     r#"{ "migration_directory": "migrations", "max_connections": 4 }"#,
/// )
/// .unwrap();
///
/// assert_eq!(config.migration_table, "schema_migrations");
/// assert_eq!(config.max_connections, 4);
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Version table name (default: `schema_migrations`)
    #[serde(default = "default_migration_table")]
    pub migration_table: String,

    /// Directory of `<version>_<name>.sql` migration scripts
    #[serde(default)]
    pub migration_directory: Option<String>,

    /// Directory of `<version>...` seed subdirectories
    #[serde(default)]
    pub seed_directory: Option<String>,

    /// Maximum pooled connections (default: 16)
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Bound on each backend call in milliseconds (default: 30000)
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,

    /// Where migration and seed scripts are read from
    #[serde(skip)]
    pub migration_source: Option<Arc<dyn MigrationSource>>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            migration_table: default_migration_table(),
            migration_directory: None,
            seed_directory: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            operation_timeout_ms: DEFAULT_OPERATION_TIMEOUT_MS,
            migration_source: None,
        }
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("migration_table", &self.migration_table)
            .field("migration_directory", &self.migration_directory)
            .field("seed_directory", &self.seed_directory)
            .field("max_connections", &self.max_connections)
            .field("operation_timeout_ms", &self.operation_timeout_ms)
            .field("migration_source", &self.migration_source.is_some())
            .finish()
    }
}

impl DatabaseConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set the version table name
    pub fn with_migration_table(mut self, table: impl Into<String>) -> Self {
        self.migration_table = table.into();
        self
    }

    /// Set the migration directory
    pub fn with_migration_directory(mut self, dir: impl Into<String>) -> Self {
        self.migration_directory = Some(dir.into());
        self
    }

    /// Set the seed directory
    pub fn with_seed_directory(mut self, dir: impl Into<String>) -> Self {
        self.seed_directory = Some(dir.into());
        self
    }

    /// Set the maximum number of pooled connections
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max.max(1);
        self
    }

    /// Set the bound on each backend call
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the migration source
    pub fn with_migration_source(mut self, source: Arc<dyn MigrationSource>) -> Self {
        self.migration_source = Some(source);
        self
    }

    /// Bound on each backend call
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::MemorySource;

    #[test]
    fn test_defaults() {
        let config = DatabaseConfig::default();
        assert_eq!(config.migration_table, "schema_migrations");
        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(config.operation_timeout(), Duration::from_secs(30));
        assert!(config.migration_directory.is_none());
        assert!(config.migration_source.is_none());
    }

    #[test]
    fn test_from_json() {
        let config = DatabaseConfig::from_json(
            r#"{
                "migration_table": "versions",
                "migration_directory": "db/migrations",
                "seed_directory": "db/seeds/",
                "operation_timeout_ms": 500
            }"#,
        )
        .unwrap();

        assert_eq!(config.migration_table, "versions");
        assert_eq!(config.migration_directory.as_deref(), Some("db/migrations"));
        assert_eq!(config.seed_directory.as_deref(), Some("db/seeds/"));
        assert_eq!(config.operation_timeout(), Duration::from_millis(500));
        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(DatabaseConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_builder() {
        let config = DatabaseConfig::new()
            .with_migration_table("versions")
            .with_migration_directory("migrations")
            .with_seed_directory("seeds")
            .with_max_connections(0)
            .with_operation_timeout(Duration::from_secs(2))
            .with_migration_source(Arc::new(MemorySource::new()));

        assert_eq!(config.migration_table, "versions");
        assert_eq!(config.max_connections, 1);
        assert_eq!(config.operation_timeout_ms, 2000);
        assert!(config.migration_source.is_some());
        assert!(format!("{:?}", config).contains("migration_source: true"));
    }
}
