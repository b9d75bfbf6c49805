//! SQL Server backend on `tiberius`.
//!
//! tiberius only understands positional `@P1..@Pn` placeholders, so named parameters are
//! translated just before a chunk is sent. Stored procedures are sent as `EXEC` statements.

mod client;
mod connection;
mod params;
mod query;

use async_trait::async_trait;

pub use client::{MssqlClient, connect_ado};
pub use connection::MssqlConnection;
pub use params::statement_text;

use crate::driver::{DbConnection, DbDriver};
use crate::error::SqlBatchError;
use crate::types::DriverKind;

/// Driver handle for SQL Server, configured by ADO.NET-style connection strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct MssqlDriver;

impl MssqlDriver {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DbDriver for MssqlDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Mssql
    }

    fn parameter_prefix(&self) -> &str {
        "@"
    }

    async fn connect(&self, connection_string: &str) -> Result<Box<dyn DbConnection>, SqlBatchError> {
        let client = connect_ado(connection_string).await?;
        Ok(Box::new(MssqlConnection::new(client)))
    }
}
