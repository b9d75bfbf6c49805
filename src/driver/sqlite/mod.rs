//! SQLite backend on `rusqlite`.
//!
//! rusqlite is synchronous, so every call runs on the blocking pool with the connection
//! behind an async mutex. Parameters are bound by name, which SQLite supports natively for
//! the `@name` form the batch engine emits.

mod connection;
mod params;
mod query;

use std::time::Duration;

use async_trait::async_trait;

pub use connection::SqliteConnection;
pub use params::{row_value_to_sqlite_value, sqlite_value_to_row_value};

use crate::config::{DEFAULT_COMMAND_TIMEOUT_SECS, connection_string_pairs, parse_connection_string};
use crate::driver::{DbConnection, DbDriver};
use crate::error::SqlBatchError;
use crate::types::DriverKind;

/// Options read from a SQLite connection string.
///
/// Accepts either `Data Source=path;Command Timeout=n` or a bare file path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteOptions {
    pub db_path: String,
    pub busy_timeout: Duration,
}

impl SqliteOptions {
    #[must_use]
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            busy_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
        }
    }

    /// # Errors
    /// Returns `SqlBatchError::ConfigError` if no database path can be found.
    pub fn from_connection_string(connection_string: &str) -> Result<Self, SqlBatchError> {
        let trimmed = connection_string.trim();
        if !trimmed.contains('=') {
            if trimmed.is_empty() {
                return Err(SqlBatchError::ConfigError("empty SQLite connection string".into()));
            }
            return Ok(Self::new(trimmed));
        }

        let pairs = connection_string_pairs(trimmed);
        let db_path = ["data source", "datasource", "filename"]
            .iter()
            .find_map(|k| pairs.get(*k))
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                SqlBatchError::ConfigError("SQLite connection string has no Data Source".into())
            })?;
        let info = parse_connection_string(trimmed);
        Ok(Self {
            db_path: db_path.clone(),
            busy_timeout: Duration::from_secs(info.command_timeout_secs),
        })
    }
}

/// Driver handle for SQLite databases.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDriver;

impl SqliteDriver {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DbDriver for SqliteDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Sqlite
    }

    fn parameter_prefix(&self) -> &str {
        "@"
    }

    async fn connect(&self, connection_string: &str) -> Result<Box<dyn DbConnection>, SqlBatchError> {
        let options = SqliteOptions::from_connection_string(connection_string)?;
        let conn = SqliteConnection::open(options).await?;
        Ok(Box::new(conn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_from_key_value_string() {
        let opts = SqliteOptions::from_connection_string("Data Source=/tmp/a.db; Command Timeout=5").unwrap();
        assert_eq!(opts.db_path, "/tmp/a.db");
        assert_eq!(opts.busy_timeout, Duration::from_secs(5));
    }

    #[test]
    fn options_from_bare_path() {
        let opts = SqliteOptions::from_connection_string(":memory:").unwrap();
        assert_eq!(opts.db_path, ":memory:");
        assert_eq!(opts.busy_timeout, Duration::from_secs(30));
    }

    #[test]
    fn missing_data_source_is_config_error() {
        let err = SqliteOptions::from_connection_string("Command Timeout=5").unwrap_err();
        assert!(matches!(err, SqlBatchError::ConfigError(_)));
    }
}
