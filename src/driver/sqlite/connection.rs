use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{InterruptHandle, OpenFlags};
use tokio::sync::Mutex;
use tokio::task::spawn_blocking;

use super::SqliteOptions;
use super::params::named_values;
use super::query;
use crate::driver::DbConnection;
use crate::error::SqlBatchError;
use crate::parameter::Parameter;
use crate::results::ResultSet;
use crate::types::CommandKind;

type SharedConn = Arc<Mutex<rusqlite::Connection>>;

/// One open SQLite database handle.
///
/// Dropping the last reference closes the handle, and SQLite rolls back any open transaction
/// when that happens.
pub struct SqliteConnection {
    conn: SharedConn,
    interrupt: InterruptHandle,
    db_path: String,
}

impl SqliteConnection {
    /// # Errors
    /// Returns `SqlBatchError::ConnectionError` if the database cannot be opened.
    pub async fn open(options: SqliteOptions) -> Result<Self, SqlBatchError> {
        let db_path = options.db_path.clone();
        let raw = spawn_blocking(move || {
            let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX;
            let conn = rusqlite::Connection::open_with_flags(&options.db_path, flags).map_err(|e| {
                SqlBatchError::ConnectionError(format!("cannot open SQLite database {}: {e}", options.db_path))
            })?;
            conn.busy_timeout(options.busy_timeout)?;
            Ok::<_, SqlBatchError>(conn)
        })
        .await??;

        let interrupt = raw.get_interrupt_handle();
        Ok(Self {
            conn: Arc::new(Mutex::new(raw)),
            interrupt,
            db_path,
        })
    }

    async fn run<F, R>(&self, func: F) -> Result<R, SqlBatchError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R, SqlBatchError> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        spawn_blocking(move || {
            let mut guard = conn.blocking_lock();
            func(&mut guard)
        })
        .await
        .map_err(|e| SqlBatchError::ExecutionError(format!("sqlite spawn_blocking join error: {e}")))?
    }

    async fn run_batch(&self, sql: &'static str) -> Result<(), SqlBatchError> {
        self.run(move |conn| conn.execute_batch(sql).map_err(SqlBatchError::SqliteError))
            .await
    }
}

fn effective_sql(sql: &str, kind: CommandKind) -> Result<String, SqlBatchError> {
    match kind {
        CommandKind::Text => Ok(sql.to_owned()),
        CommandKind::TableDirect => Ok(format!("SELECT * FROM {sql}")),
        CommandKind::StoredProcedure => Err(SqlBatchError::Unimplemented(
            "SQLite has no stored procedures".into(),
        )),
    }
}

#[async_trait]
impl DbConnection for SqliteConnection {
    async fn begin(&mut self) -> Result<(), SqlBatchError> {
        self.run_batch("BEGIN").await
    }

    async fn commit(&mut self) -> Result<(), SqlBatchError> {
        self.run_batch("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<(), SqlBatchError> {
        self.run(|conn| {
            if !conn.is_autocommit() {
                conn.execute_batch("ROLLBACK")?;
            }
            Ok(())
        })
        .await
    }

    async fn query_multiple(
        &mut self,
        sql: &str,
        kind: CommandKind,
        params: &[Parameter],
    ) -> Result<Vec<ResultSet>, SqlBatchError> {
        let sql = effective_sql(sql, kind)?;
        let values = named_values(params);
        self.run(move |conn| query::query_multiple(conn, &sql, &values)).await
    }

    async fn execute(
        &mut self,
        sql: &str,
        kind: CommandKind,
        params: &[Parameter],
    ) -> Result<usize, SqlBatchError> {
        let sql = effective_sql(sql, kind)?;
        let values = named_values(params);
        self.run(move |conn| query::execute(conn, &sql, &values)).await
    }

    fn cancel(&self) {
        self.interrupt.interrupt();
    }

    async fn close(&mut self) -> Result<(), SqlBatchError> {
        self.rollback().await
    }
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}
