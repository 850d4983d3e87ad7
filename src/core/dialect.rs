//! SQL dialect definitions
//!
//! A dialect selects the backend adapter and the placeholder syntax used when
//! rendering parameterized queries.

use super::error::DatabaseError;
use super::placeholder::Placeholder;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Supported SQL dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// PostgreSQL
    Postgres,
    /// Amazon Redshift (served by the PostgreSQL adapter)
    Redshift,
    /// SQLite
    Sqlite,
}

impl Dialect {
    /// Convert dialect to string representation
    pub fn to_str(&self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::Redshift => "redshift",
            Dialect::Sqlite => "sqlite",
        }
    }

    /// Placeholder syntax for positional parameters
    pub fn placeholder(&self) -> Placeholder {
        match self {
            Dialect::Postgres | Dialect::Redshift => Placeholder::DOLLAR,
            Dialect::Sqlite => Placeholder::QUESTION,
        }
    }

    /// Whether the dialect is served by the PostgreSQL wire protocol
    pub fn is_postgres_family(&self) -> bool {
        matches!(self, Dialect::Postgres | Dialect::Redshift)
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

impl FromStr for Dialect {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "redshift" => Ok(Dialect::Redshift),
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            _ => Err(DatabaseError::UnrecognizedDialect(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_from_str() {
        assert_eq!("postgres".parse::<Dialect>().ok(), Some(Dialect::Postgres));
        assert_eq!("PostgreSQL".parse::<Dialect>().ok(), Some(Dialect::Postgres));
        assert_eq!("redshift".parse::<Dialect>().ok(), Some(Dialect::Redshift));
        assert_eq!("sqlite3".parse::<Dialect>().ok(), Some(Dialect::Sqlite));
    }

    #[test]
    fn test_unrecognized_dialect() {
        let err = "mssql".parse::<Dialect>().unwrap_err();
        assert!(matches!(err, DatabaseError::UnrecognizedDialect(ref d) if d == "mssql"));
    }

    #[test]
    fn test_dialect_placeholder() {
        assert_eq!(Dialect::Postgres.placeholder(), Placeholder::DOLLAR);
        assert_eq!(Dialect::Redshift.placeholder(), Placeholder::DOLLAR);
        assert!(Dialect::Sqlite.placeholder().is_native());
    }

    #[test]
    fn test_dialect_display() {
        assert_eq!(Dialect::Redshift.to_string(), "redshift");
        assert!(Dialect::Redshift.is_postgres_family());
        assert!(!Dialect::Sqlite.is_postgres_family());
    }
}
