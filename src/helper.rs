//! `SqlHelper`: the builder most callers use.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sql_batch::prelude::*;
//!
//! # async fn run() -> Result<(), SqlBatchError> {
//! let descriptor = ConnectionDescriptor::for_kind(DriverKind::Sqlite, "main", "Data Source=app.db")?;
//! let mut helper = SqlHelper::new(Arc::new(descriptor));
//! helper.add_query("UPDATE users SET seen = 1 WHERE id = @0", args![42]);
//! helper
//!     .add_query("SELECT name FROM users WHERE id = @0", args![42])
//!     .on_result(|_: &Command, sets: &[ResultSet], _: Option<&CallbackContext>| {
//!         println!("{} row(s)", sets.first().map_or(0, ResultSet::len));
//!     });
//! helper.execute().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::batch::Batch;
use crate::command::Command;
use crate::config::ConnectionStringSource;
use crate::descriptor::{ConnectionDescriptor, DescriptorRegistry};
use crate::driver::DbDriver;
use crate::error::SqlBatchError;
use crate::parameter::Arg;
use crate::results::{FromRowValue, ResultSet};
use crate::types::{CommandKind, RowValues};

/// Queues commands against one descriptor and executes them as a batch.
#[derive(Debug, Clone)]
pub struct SqlHelper {
    batch: Batch,
}

impl SqlHelper {
    #[must_use]
    pub fn new(descriptor: Arc<ConnectionDescriptor>) -> Self {
        Self {
            batch: Batch::new(descriptor),
        }
    }

    /// Build a helper for `name`, reusing the registry's descriptor or registering a new one.
    ///
    /// # Errors
    /// Returns `SqlBatchError::ConfigError` if the name cannot be resolved to a connection string.
    pub fn from_registry(
        registry: &DescriptorRegistry,
        name: &str,
        source: &dyn ConnectionStringSource,
        driver: Arc<dyn DbDriver>,
    ) -> Result<Self, SqlBatchError> {
        let descriptor =
            registry.get_or_insert_with(name, || ConnectionDescriptor::resolve(name, source, driver))?;
        Ok(Self::new(descriptor))
    }

    #[must_use]
    pub fn descriptor(&self) -> &Arc<ConnectionDescriptor> {
        self.batch.descriptor()
    }

    #[must_use]
    pub fn batch(&self) -> &Batch {
        &self.batch
    }

    #[must_use]
    pub fn commands(&self) -> &[Command] {
        self.batch.commands()
    }

    fn build(&self, kind: CommandKind, sql: &str, args: Vec<Arg>) -> Command {
        let descriptor = self.batch.descriptor();
        let starter = descriptor.parameter_prefix();
        let parameters = args
            .into_iter()
            .enumerate()
            .map(|(i, arg)| arg.into_parameter(i, starter))
            .collect();
        Command::new(sql, kind, parameters, starter, descriptor.classifier())
    }

    /// Queue a SQL text command. Raw arguments become parameters `@0`, `@1`, ...
    pub fn add_query(&mut self, sql: &str, args: Vec<Arg>) -> &mut Command {
        self.add_query_with(CommandKind::Text, sql, args)
    }

    pub fn add_query_with(&mut self, kind: CommandKind, sql: &str, args: Vec<Arg>) -> &mut Command {
        let command = self.build(kind, sql, args);
        self.batch.push(command)
    }

    pub fn add_stored_procedure(&mut self, name: &str, args: Vec<Arg>) -> &mut Command {
        self.add_query_with(CommandKind::StoredProcedure, name, args)
    }

    /// Queue a command replayed at the top of every chunk, such as a `DECLARE`.
    pub fn add_header(&mut self, sql: &str, args: Vec<Arg>) -> &mut Command {
        let command = self.build(CommandKind::Text, sql, args).into_header();
        self.batch.push(command)
    }

    /// Queue an already-built command.
    pub fn add_command(&mut self, command: Command) -> &mut Command {
        self.batch.push(command)
    }

    /// Append every command queued on `other`, in order.
    pub fn add_helper(&mut self, other: &SqlHelper) {
        self.batch.extend(other.commands().iter().cloned());
    }

    /// Start over with an empty command list.
    pub fn create_batch(&mut self) {
        self.batch.clear();
    }

    /// Start over with an empty command list against another descriptor.
    pub fn create_batch_with(&mut self, descriptor: Arc<ConnectionDescriptor>) {
        self.batch.clear();
        self.batch.set_descriptor(descriptor);
    }

    /// Drop commands equal to an earlier one, keeping first occurrences in place.
    pub fn remove_duplicate_commands(&mut self) {
        let commands = std::mem::take(self.batch.commands_mut());
        let mut buckets: HashMap<(String, CommandKind, usize), Vec<usize>> = HashMap::new();
        let mut kept: Vec<Command> = Vec::with_capacity(commands.len());
        for command in commands {
            let key = (
                command.sql_text().to_lowercase(),
                command.kind(),
                command.parameter_count(),
            );
            let bucket = buckets.entry(key).or_default();
            if bucket.iter().any(|&i| kept[i] == command) {
                continue;
            }
            bucket.push(kept.len());
            kept.push(command);
        }
        *self.batch.commands_mut() = kept;
    }

    /// # Errors
    /// See [`Batch::execute`].
    pub async fn execute(&self) -> Result<Vec<ResultSet>, SqlBatchError> {
        self.batch.execute().await
    }

    /// Run [`execute`](Self::execute) on a private current-thread runtime.
    ///
    /// # Errors
    /// Returns `SqlBatchError::ExecutionError` when called from inside a tokio runtime, plus
    /// everything [`Batch::execute`] can return.
    pub fn execute_blocking(&self) -> Result<Vec<ResultSet>, SqlBatchError> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(SqlBatchError::ExecutionError(
                "execute_blocking called inside a tokio runtime; await execute() instead".into(),
            ));
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.batch.execute())
    }

    /// First column of the first row of the first row-returning result set, or `default`.
    ///
    /// A NULL value yields `default` as well.
    ///
    /// # Errors
    /// Returns `SqlBatchError::ConversionError` when the value exists but is not a `T`, plus
    /// everything [`Batch::execute`] can return.
    pub async fn execute_scalar<T: FromRowValue>(&self, default: T) -> Result<T, SqlBatchError> {
        let sets = self.batch.execute().await?;
        let Some(value) = sets
            .iter()
            .find(|set| set.get_column_names().is_some())
            .and_then(ResultSet::first_value)
        else {
            return Ok(default);
        };
        if matches!(value, RowValues::Null) {
            return Ok(default);
        }
        T::from_row_value(value).ok_or_else(|| {
            SqlBatchError::ConversionError(format!(
                "scalar {value:?} cannot be read as {}",
                std::any::type_name::<T>()
            ))
        })
    }
}

impl fmt::Display for SqlHelper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.batch, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::Parameter;
    use crate::test_utils::RecordingDriver;

    fn helper() -> SqlHelper {
        let descriptor = ConnectionDescriptor::new("t", "Server=test", Arc::new(RecordingDriver::new())).unwrap();
        SqlHelper::new(Arc::new(descriptor))
    }

    #[test]
    fn display_inlines_merged_parameters() {
        let mut h = helper();
        h.add_query("SELECT * FROM T WHERE ID=@0", crate::args![1]);
        h.add_query("SELECT * FROM T WHERE ID=@0", crate::args![10]);
        assert_eq!(h.to_string(), "SELECT * FROM T WHERE ID=1\nSELECT * FROM T WHERE ID=10");
    }

    #[test]
    fn ready_made_parameters_follow_the_connection_prefix() {
        let descriptor = ConnectionDescriptor::new("t", "Server=test", Arc::new(RecordingDriver::new()))
            .unwrap()
            .with_parameter_prefix(":");
        let mut h = SqlHelper::new(Arc::new(descriptor));
        h.add_query(
            "SELECT * FROM T WHERE ID=:id",
            crate::args![Parameter::infer("id", RowValues::Int(5))],
        );
        assert_eq!(h.commands()[0].starter(), ":");
        let plan = h.batch().plan();
        assert_eq!(plan[0].sql, "SELECT * FROM T WHERE ID=:idCommand0;");
        assert_eq!(plan[0].parameters[0].placeholder(), ":idCommand0");
        assert_eq!(h.to_string(), "SELECT * FROM T WHERE ID=5");
    }

    #[test]
    fn duplicate_removal_keeps_first_and_is_idempotent() {
        let mut h = helper();
        h.add_query("SELECT * FROM T WHERE ID=@0", crate::args![1]);
        h.add_query("select * from t where id=@0", crate::args![1]);
        h.add_query("SELECT * FROM T WHERE ID=@0", crate::args![2]);
        h.remove_duplicate_commands();
        assert_eq!(h.commands().len(), 2);
        assert_eq!(h.commands()[0].sql_text(), "SELECT * FROM T WHERE ID=@0");
        let before = h.to_string();
        h.remove_duplicate_commands();
        assert_eq!(h.commands().len(), 2);
        assert_eq!(h.to_string(), before);
    }

    #[test]
    fn add_helper_splices_in_order() {
        let mut a = helper();
        a.add_query("SELECT 1", Vec::new());
        let mut b = helper();
        b.add_query("SELECT 2", Vec::new());
        b.add_query("SELECT 3", Vec::new());
        a.add_helper(&b);
        let texts: Vec<&str> = a.commands().iter().map(Command::sql_text).collect();
        assert_eq!(texts, vec!["SELECT 1", "SELECT 2", "SELECT 3"]);
        a.create_batch();
        assert!(a.commands().is_empty());
    }

    #[tokio::test]
    async fn execute_blocking_refuses_inside_runtime() {
        let h = helper();
        assert!(matches!(h.execute_blocking(), Err(SqlBatchError::ExecutionError(_))));
    }
}
