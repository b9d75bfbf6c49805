//! Convenient imports for common functionality.
//!
//! `use sql_batch::prelude::*;` brings in the helper, the value and result types, and the
//! `args!` macro.

pub use crate::args;
pub use crate::batch::Batch;
pub use crate::command::{CallbackContext, Command, ResultHandler};
pub use crate::config::{ConnectionSettings, ConnectionStringSource, EnvSource};
pub use crate::descriptor::{ConnectionDescriptor, DescriptorRegistry};
pub use crate::driver::{DbConnection, DbDriver};
pub use crate::error::SqlBatchError;
pub use crate::helper::SqlHelper;
pub use crate::parameter::{Arg, Parameter};
pub use crate::results::{CustomDbRow, FromRow, FromRowValue, ResultSet};
pub use crate::types::{CommandKind, DbType, DriverKind, ParameterDirection, RowValues};

#[cfg(feature = "sqlite")]
pub use crate::driver::sqlite::SqliteDriver;

#[cfg(feature = "mssql")]
pub use crate::driver::mssql::MssqlDriver;
