use thiserror::Error;

#[cfg(feature = "sqlite")]
use rusqlite;
#[cfg(feature = "mssql")]
use tiberius;

#[derive(Debug, Error)]
pub enum SqlBatchError {
    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[cfg(feature = "mssql")]
    #[error(transparent)]
    MssqlError(#[from] tiberius::error::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Parameter conversion error: {0}")]
    ParameterError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Command timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Value conversion error: {0}")]
    ConversionError(String),

    #[error("Unimplemented feature: {0}")]
    Unimplemented(String),

    #[error("Other database error: {0}")]
    Other(String),
}

impl SqlBatchError {
    /// True for failures raised while opening a connection.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(self, SqlBatchError::ConnectionError(_))
    }
}

impl From<tokio::task::JoinError> for SqlBatchError {
    fn from(err: tokio::task::JoinError) -> Self {
        SqlBatchError::ExecutionError(format!("blocking task failed: {err}"))
    }
}

impl From<std::io::Error> for SqlBatchError {
    fn from(err: std::io::Error) -> Self {
        SqlBatchError::Other(format!("I/O error: {err}"))
    }
}
