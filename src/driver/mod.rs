//! Database driver capability.
//!
//! The batch engine only needs a handful of operations from a database: open a connection,
//! run a parameterized (possibly multi-statement) command for rows or for an affected count,
//! and drive a transaction. [`DbDriver`] and [`DbConnection`] describe exactly that, and the
//! `sqlite` / `mssql` modules implement them. Pooling is left to the driver; the engine opens
//! one connection per execution and closes it afterwards.

use std::fmt::Debug;

use async_trait::async_trait;

use crate::error::SqlBatchError;
use crate::parameter::Parameter;
use crate::results::ResultSet;
use crate::types::{CommandKind, DriverKind};

#[cfg(feature = "mssql")]
pub mod mssql;
#[cfg(feature = "sqlite")]
pub mod sqlite;

/// Produces connections for one database engine.
#[async_trait]
pub trait DbDriver: Send + Sync + Debug {
    fn kind(&self) -> DriverKind;

    /// Placeholder prefix this engine understands for named parameters.
    fn parameter_prefix(&self) -> &str;

    /// Open a new connection.
    ///
    /// Transient failures must be reported as `SqlBatchError::ConnectionError` so
    /// [`open_with_retry`] knows to try again.
    async fn connect(&self, connection_string: &str) -> Result<Box<dyn DbConnection>, SqlBatchError>;
}

/// One open connection.
#[async_trait]
pub trait DbConnection: Send {
    async fn begin(&mut self) -> Result<(), SqlBatchError>;

    async fn commit(&mut self) -> Result<(), SqlBatchError>;

    async fn rollback(&mut self) -> Result<(), SqlBatchError>;

    /// Run `sql` and collect every result set it returns, in order.
    async fn query_multiple(
        &mut self,
        sql: &str,
        kind: CommandKind,
        params: &[Parameter],
    ) -> Result<Vec<ResultSet>, SqlBatchError>;

    /// Run `sql` for its affected-row count.
    async fn execute(
        &mut self,
        sql: &str,
        kind: CommandKind,
        params: &[Parameter],
    ) -> Result<usize, SqlBatchError>;

    /// Best-effort interrupt of whatever the connection is running.
    fn cancel(&self) {}

    /// Release the connection, rolling back any transaction still open.
    async fn close(&mut self) -> Result<(), SqlBatchError>;
}

/// Open a connection, retrying connection failures immediately up to `retries` times.
///
/// Errors other than `ConnectionError` (a malformed connection string, say) are returned
/// on the first attempt.
///
/// # Errors
/// Returns the last `SqlBatchError::ConnectionError` once every attempt has failed.
pub async fn open_with_retry(
    driver: &dyn DbDriver,
    connection_string: &str,
    retries: u32,
) -> Result<Box<dyn DbConnection>, SqlBatchError> {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match driver.connect(connection_string).await {
            Ok(conn) => return Ok(conn),
            Err(err) if err.is_connection_error() => {
                tracing::warn!(attempt, retries, driver = ?driver.kind(), %err, "connection attempt failed");
                if attempt > retries {
                    return Err(err);
                }
            }
            Err(err) => return Err(err),
        }
    }
}
