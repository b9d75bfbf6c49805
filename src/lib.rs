//! Queue SQL commands, send them to the database in as few round-trips as possible, and hand
//! each command its own result sets back.
//!
//! Commands are added through [`SqlHelper`]. When the helper executes, its [`Batch`] rewrites
//! every command's placeholders with a per-command suffix so they can share one round-trip,
//! splits the work into chunks that respect the descriptor's parameter ceiling (2000 by
//! default), replays header commands into every chunk, and wraps the run in a transaction when
//! more than one command changes data. Result sets are routed back to each command's
//! [`ResultHandler`] in queue order.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sql_batch::prelude::*;
//!
//! # async fn run() -> Result<(), SqlBatchError> {
//! let registry = DescriptorRegistry::new();
//! let settings = ConnectionSettings::from_json_str(
//!     r#"{ "connection_strings": { "Default": "Data Source=app.db" } }"#,
//! )?;
//! let mut helper = SqlHelper::from_registry(&registry, "", &settings, Arc::new(SqliteDriver::new()))?;
//!
//! helper.add_header("CREATE TABLE IF NOT EXISTS t (id INTEGER, name TEXT)", args![]);
//! helper.add_query("INSERT INTO t (id, name) VALUES (@0, @1)", args![1, "alpha"]);
//! helper.add_query("SELECT COUNT(*) FROM t", args![]);
//! let count: i64 = helper.execute_scalar(0).await?;
//! assert!(count >= 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - `sqlite` (default): SQLite backend on `rusqlite`.
//! - `mssql`: SQL Server backend on `tiberius`.
//! - `test-utils`: [`test_utils::RecordingDriver`], an in-memory driver for tests.

pub mod batch;
pub mod classify;
pub mod command;
pub mod config;
pub mod descriptor;
pub mod driver;
pub mod error;
pub mod helper;
pub mod parameter;
pub mod prelude;
pub mod results;
pub mod translation;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use batch::{Batch, Chunk};
pub use classify::{Classification, DefaultClassifier, HeuristicClassifier, ParserClassifier, StatementClassifier};
pub use command::{CallbackContext, Command, ResultHandler};
pub use config::{ConnectionSettings, ConnectionStringSource, EnvSource};
pub use descriptor::{ConnectionDescriptor, DEFAULT_PARAMETER_CEILING, DescriptorRegistry};
pub use driver::{DbConnection, DbDriver, open_with_retry};
pub use error::SqlBatchError;
pub use helper::SqlHelper;
pub use parameter::{Arg, DEFAULT_PARAMETER_STARTER, ParamValue, Parameter};
pub use results::{CustomDbRow, FromRow, FromRowValue, ResultSet};
pub use types::{CommandKind, DbType, DriverKind, ParameterDirection, RowValues};
