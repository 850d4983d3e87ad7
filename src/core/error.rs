//! Error types for the data-access layer
//!
//! Every failure surfaced by a transaction, a backend adapter or the migration
//! orchestrator is expressed as a [`DatabaseError`]. Driver-specific errors are mapped
//! into this taxonomy at the adapter boundary.
//!
//! `DatabaseError` is `Clone` so that a transaction can hand the same recorded error
//! back to every later caller. Foreign error types are therefore held behind `Arc`.

use std::sync::Arc;

/// Result type alias for database operations
pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Error types for database operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum DatabaseError {
    /// Single-row read matched no rows
    #[error("the requested item does not exist")]
    NotFound,

    /// Multi-row read matched no rows
    #[error("there are no items matching your search criteria")]
    NoResults,

    /// Integrity constraint violation on write
    #[error("there was a conflict processing your request: {0}")]
    Conflict(String),

    /// The transaction's pending-view queue is full
    #[error("read batch size exhausted ({capacity} pending views)")]
    BatchExhausted { capacity: usize },

    /// Dialect string did not select any backend adapter
    #[error("unrecognized dialect: '{0}'")]
    UnrecognizedDialect(String),

    /// Migration or seed failure
    #[error("Migration error: {message}")]
    Migration {
        message: String,
        #[source]
        source: Option<Box<DatabaseError>>,
    },

    /// The migrator has nothing left to apply
    #[error("no next version found")]
    NoNextVersion,

    /// Connection error (generic)
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Connection timeout
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout { timeout_ms: u64 },

    /// Query execution error
    #[error("Query execution error: {0}")]
    QueryError(String),

    /// Query timeout
    #[error("Query timeout after {timeout_ms}ms")]
    QueryTimeout { timeout_ms: u64 },

    /// Invalid connection string
    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),

    /// Transaction error
    #[error("Transaction error: {0}")]
    TransactionError(String),

    /// Row (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Unsupported operation
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[source] Arc<std::io::Error>),

    /// SQLite error
    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    SqliteError(#[source] Arc<rusqlite::Error>),

    /// PostgreSQL error
    #[cfg(feature = "postgres")]
    #[error("PostgreSQL error: {0}")]
    PostgresError(#[source] Arc<tokio_postgres::Error>),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl DatabaseError {
    /// Create a new connection error (generic)
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        DatabaseError::ConnectionError(msg.into())
    }

    /// Create a connection timeout error
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        DatabaseError::ConnectionTimeout { timeout_ms }
    }

    /// Create a new query error
    pub fn query<S: Into<String>>(msg: S) -> Self {
        DatabaseError::QueryError(msg.into())
    }

    /// Create a query timeout error
    pub fn query_timeout(timeout_ms: u64) -> Self {
        DatabaseError::QueryTimeout { timeout_ms }
    }

    /// Create a conflict error
    pub fn conflict<S: Into<String>>(msg: S) -> Self {
        DatabaseError::Conflict(msg.into())
    }

    /// Create a new transaction error
    pub fn transaction<S: Into<String>>(msg: S) -> Self {
        DatabaseError::TransactionError(msg.into())
    }

    /// Create a migration error without an underlying cause
    pub fn migration<S: Into<String>>(msg: S) -> Self {
        DatabaseError::Migration {
            message: msg.into(),
            source: None,
        }
    }

    /// Wrap the error that aborted a migration run
    pub fn migration_failed<S: Into<String>>(msg: S, cause: DatabaseError) -> Self {
        DatabaseError::Migration {
            message: msg.into(),
            source: Some(Box::new(cause)),
        }
    }

    /// Create a serialization error
    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        DatabaseError::Serialization(msg.into())
    }

    /// Create a new unsupported operation error
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        DatabaseError::UnsupportedOperation(msg.into())
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        DatabaseError::Other(msg.into())
    }

    /// True for [`DatabaseError::NotFound`]
    pub fn is_not_found(&self) -> bool {
        matches!(self, DatabaseError::NotFound)
    }

    /// True for [`DatabaseError::NoResults`]
    pub fn is_no_results(&self) -> bool {
        matches!(self, DatabaseError::NoResults)
    }

    /// True for [`DatabaseError::Conflict`]
    pub fn is_conflict(&self) -> bool {
        matches!(self, DatabaseError::Conflict(_))
    }

    /// True for the migrator's terminal "nothing left to apply" signal
    pub fn is_no_next_version(&self) -> bool {
        matches!(self, DatabaseError::NoNextVersion)
    }

    /// Whether this error leaves a transaction unusable.
    ///
    /// Empty reads are ordinary outcomes and do not poison the transaction.
    pub fn poisons_transaction(&self) -> bool {
        !matches!(self, DatabaseError::NotFound | DatabaseError::NoResults)
    }
}

impl From<std::io::Error> for DatabaseError {
    fn from(err: std::io::Error) -> Self {
        DatabaseError::IoError(Arc::new(err))
    }
}

impl From<serde_json::Error> for DatabaseError {
    fn from(err: serde_json::Error) -> Self {
        DatabaseError::Serialization(err.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(code, message)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                DatabaseError::Conflict(message.unwrap_or_else(|| code.to_string()))
            }
            other => DatabaseError::SqliteError(Arc::new(other)),
        }
    }
}

#[cfg(feature = "postgres")]
impl From<tokio_postgres::Error> for DatabaseError {
    fn from(err: tokio_postgres::Error) -> Self {
        // SQLSTATE class 23 covers every integrity constraint violation
        if let Some(state) = err.code() {
            if state.code().starts_with("23") {
                let message = err
                    .as_db_error()
                    .map(|db| db.message().to_string())
                    .unwrap_or_else(|| err.to_string());
                return DatabaseError::Conflict(message);
            }
        }
        DatabaseError::PostgresError(Arc::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = DatabaseError::connection("Failed to connect");
        assert!(matches!(err, DatabaseError::ConnectionError(_)));

        let err = DatabaseError::query("Invalid SQL");
        assert!(matches!(err, DatabaseError::QueryError(_)));

        let err = DatabaseError::migration_failed("run aborted", DatabaseError::NoResults);
        assert!(matches!(
            err,
            DatabaseError::Migration {
                source: Some(_),
                ..
            }
        ));
    }

    #[test]
    fn test_error_display() {
        let err = DatabaseError::BatchExhausted { capacity: 8 };
        assert_eq!(err.to_string(), "read batch size exhausted (8 pending views)");

        let err = DatabaseError::UnrecognizedDialect("oracle".to_string());
        assert_eq!(err.to_string(), "unrecognized dialect: 'oracle'");

        let err = DatabaseError::migration("duplicate version 3");
        assert_eq!(err.to_string(), "Migration error: duplicate version 3");
    }

    #[test]
    fn test_empty_reads_do_not_poison() {
        assert!(!DatabaseError::NotFound.poisons_transaction());
        assert!(!DatabaseError::NoResults.poisons_transaction());
        assert!(DatabaseError::conflict("dup").poisons_transaction());
        assert!(DatabaseError::BatchExhausted { capacity: 1 }.poisons_transaction());
    }

    #[test]
    fn test_clone_keeps_message() {
        let err = DatabaseError::from(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "missing",
        ));
        let copy = err.clone();
        assert_eq!(err.to_string(), copy.to_string());
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_sqlite_constraint_maps_to_conflict() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: rusqlite::ErrorCode::ConstraintViolation,
                extended_code: 2067,
            },
            Some("UNIQUE constraint failed: users.email".to_string()),
        );
        let mapped = DatabaseError::from(err);
        assert!(mapped.is_conflict());
        assert!(mapped.to_string().contains("users.email"));
    }
}
