use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tiberius::Query;

use super::client::MssqlClient;
use super::params::{bind_params, statement_text};
use super::query::{collect_result_sets, convert_affected_rows};
use crate::driver::DbConnection;
use crate::error::SqlBatchError;
use crate::parameter::Parameter;
use crate::results::ResultSet;
use crate::types::CommandKind;

/// An open SQL Server session.
///
/// The server rolls back an open transaction when the session ends, so dropping the
/// connection mid-batch never commits partial work.
///
/// tiberius cannot interrupt a running request; before sending anything new the client
/// reads the previous response to the end. After `cancel` the session is therefore
/// abandoned: rollback and close become no-ops and the session is torn down when the
/// connection is dropped, which rolls back on the server.
pub struct MssqlConnection {
    client: MssqlClient,
    session: SessionState,
}

/// Transaction and cancellation bookkeeping for one session.
#[derive(Debug, Default)]
struct SessionState {
    in_transaction: bool,
    abandoned: AtomicBool,
}

impl SessionState {
    fn abandon(&self) {
        self.session.abandon();
    }

    fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::Acquire)
    }

    fn ensure_usable(&self) -> Result<(), SqlBatchError> {
        if self.is_abandoned() {
            return Err(SqlBatchError::ExecutionError(
                "session was abandoned after a cancelled request".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether a rollback should be sent; clears the open transaction either way.
    fn take_rollback(&mut self) -> bool {
        let open = std::mem::take(&mut self.in_transaction);
        open && !self.is_abandoned()
    }
}

impl MssqlConnection {
    pub(crate) fn new(client: MssqlClient) -> Self {
        Self {
            client,
            session: SessionState::default(),
        }
    }

    async fn simple(&mut self, sql: &str) -> Result<(), SqlBatchError> {
        self.session.ensure_usable()?;
        Query::new(sql).execute(&mut self.client).await?;
        Ok(())
    }
}

#[async_trait]
impl DbConnection for MssqlConnection {
    async fn begin(&mut self) -> Result<(), SqlBatchError> {
        self.simple("BEGIN TRANSACTION").await?;
        self.session.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), SqlBatchError> {
        self.simple("COMMIT TRANSACTION").await?;
        self.session.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), SqlBatchError> {
        if !self.session.take_rollback() {
            return Ok(());
        }
        self.simple("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION").await
    }

    async fn query_multiple(
        &mut self,
        sql: &str,
        kind: CommandKind,
        params: &[Parameter],
    ) -> Result<Vec<ResultSet>, SqlBatchError> {
        self.session.ensure_usable()?;
        let text = statement_text(sql, kind, params)?;
        let mut query = Query::new(text.into_owned());
        bind_params(&mut query, params);
        let stream = query.query(&mut self.client).await?;
        collect_result_sets(stream).await
    }

    async fn execute(
        &mut self,
        sql: &str,
        kind: CommandKind,
        params: &[Parameter],
    ) -> Result<usize, SqlBatchError> {
        self.session.ensure_usable()?;
        let text = statement_text(sql, kind, params)?;
        let mut query = Query::new(text.into_owned());
        bind_params(&mut query, params);
        let result = query.execute(&mut self.client).await?;
        convert_affected_rows(result.total())
    }

    fn cancel(&self) {
        tracing::debug!("abandoning SQL Server session after cancellation");
        self.session.abandon();
    }

    async fn close(&mut self) -> Result<(), SqlBatchError> {
        self.rollback().await
    }
}

impl fmt::Debug for MssqlConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MssqlConnection")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollback_only_for_an_open_live_transaction() {
        let mut session = SessionState::default();
        assert!(!session.take_rollback());

        session.in_transaction = true;
        assert!(session.take_rollback());
        assert!(!session.take_rollback());
    }

    #[test]
    fn abandoned_session_sends_nothing() {
        let mut session = SessionState {
            in_transaction: true,
            ..SessionState::default()
        };
        assert!(session.ensure_usable().is_ok());
        session.abandon();
        assert!(!session.take_rollback());
        assert!(matches!(session.ensure_usable(), Err(SqlBatchError::ExecutionError(_))));
    }
}
