//! The batch engine.
//!
//! A [`Batch`] owns an ordered list of [`Command`]s and the descriptor they run against.
//! Executing it plans chunks ([`merge`]), opens one connection, decides whether the whole run
//! needs a transaction, sends each chunk in order under the descriptor's command timeout, and
//! finally routes result sets back to the commands ([`demux`]). Callbacks only fire once every
//! chunk has succeeded and the transaction, if any, has committed.

pub mod demux;
pub mod merge;

use std::fmt;
use std::sync::Arc;

pub use demux::ChunkOutput;
pub use merge::{Chunk, STATEMENT_SEPARATOR, STATEMENT_TERMINATOR, command_suffix, header_suffix, plan_chunks};

use crate::classify::HeuristicClassifier;
use crate::command::Command;
use crate::descriptor::ConnectionDescriptor;
use crate::driver::{DbConnection, open_with_retry};
use crate::error::SqlBatchError;
use crate::results::ResultSet;

/// Ordered commands plus the descriptor they execute against.
///
/// Not meant for concurrent use; concurrent batches against one descriptor each open their own
/// connection.
#[derive(Debug, Clone)]
pub struct Batch {
    descriptor: Arc<ConnectionDescriptor>,
    commands: Vec<Command>,
}

impl Batch {
    #[must_use]
    pub fn new(descriptor: Arc<ConnectionDescriptor>) -> Self {
        Self {
            descriptor,
            commands: Vec::new(),
        }
    }

    #[must_use]
    pub fn descriptor(&self) -> &Arc<ConnectionDescriptor> {
        &self.descriptor
    }

    /// Swap the descriptor, keeping the queued commands.
    pub fn set_descriptor(&mut self, descriptor: Arc<ConnectionDescriptor>) {
        self.descriptor = descriptor;
    }

    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub(crate) fn commands_mut(&mut self) -> &mut Vec<Command> {
        &mut self.commands
    }

    /// Queue a command and hand it back for further configuration.
    pub fn push(&mut self, command: Command) -> &mut Command {
        self.commands.push(command);
        let last = self.commands.len() - 1;
        &mut self.commands[last]
    }

    pub fn extend(&mut self, commands: impl IntoIterator<Item = Command>) {
        self.commands.extend(commands);
    }

    /// Drop every queued command.
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// The chunks an `execute` call would send, without touching the database.
    #[must_use]
    pub fn plan(&self) -> Vec<Chunk> {
        plan_chunks(
            &self.commands,
            self.descriptor.parameter_ceiling(),
            self.descriptor.parameter_prefix(),
        )
    }

    /// Whether the whole run is wrapped in one transaction: more than one command, at least one
    /// of them changes data, and none of them is database-level DDL.
    #[must_use]
    pub fn needs_transaction(&self) -> bool {
        self.commands.len() > 1
            && self.commands.iter().any(Command::transaction_needed)
            && !self
                .commands
                .iter()
                .any(|c| HeuristicClassifier::is_non_transactable(c.sql_text()))
    }

    /// Execute every queued command.
    ///
    /// Returns every chunk's result sets in execution order; a chunk run as a non-query
    /// contributes one row-less set carrying its affected count. Each command's handler receives
    /// its own result sets once all chunks succeed. On failure nothing is delivered and any
    /// transaction is rolled back.
    ///
    /// # Errors
    /// Returns `SqlBatchError::ConnectionError` when the connection cannot be opened,
    /// `SqlBatchError::Timeout` when a chunk outlives the command timeout, or the driver's error
    /// when a chunk fails.
    pub async fn execute(&self) -> Result<Vec<ResultSet>, SqlBatchError> {
        let chunks = self.plan();
        if chunks.is_empty() {
            for command in &self.commands {
                command.finalize(&[]);
            }
            return Ok(Vec::new());
        }

        let use_transaction = self.needs_transaction();
        let descriptor = &self.descriptor;
        let mut conn = open_with_retry(
            descriptor.driver().as_ref(),
            descriptor.connection_string(),
            descriptor.retries(),
        )
        .await?;

        let outcome = self.run_chunks(conn.as_mut(), &chunks, use_transaction).await;
        let closed = conn.close().await;
        drop(conn);

        let outputs = outcome?;
        if let Err(err) = closed {
            tracing::warn!(%err, "closing connection failed after a successful batch");
        }

        let routed = demux::demultiplex(&self.commands, &chunks, &outputs);
        for (command, results) in self.commands.iter().zip(&routed) {
            command.finalize(results);
        }
        Ok(demux::aggregate(outputs))
    }

    async fn run_chunks(
        &self,
        conn: &mut dyn DbConnection,
        chunks: &[Chunk],
        use_transaction: bool,
    ) -> Result<Vec<ChunkOutput>, SqlBatchError> {
        if use_transaction {
            conn.begin().await?;
            tracing::debug!(database = self.descriptor.name(), "transaction started");
        }

        let mut outputs = Vec::with_capacity(chunks.len());
        for (index, chunk) in chunks.iter().enumerate() {
            tracing::debug!(
                chunk = index,
                commands = chunk.command_count(),
                parameters = chunk.parameters.len(),
                reader = chunk.finalizable,
                "executing chunk"
            );
            match self.run_chunk(conn, chunk).await {
                Ok(output) => outputs.push(output),
                Err(err) => {
                    if use_transaction {
                        rollback(conn, &err).await;
                    }
                    return Err(err);
                }
            }
        }

        if use_transaction {
            if let Err(err) = conn.commit().await {
                rollback(conn, &err).await;
                return Err(err);
            }
            tracing::debug!(database = self.descriptor.name(), "transaction committed");
        }
        Ok(outputs)
    }

    async fn run_chunk(&self, conn: &mut dyn DbConnection, chunk: &Chunk) -> Result<ChunkOutput, SqlBatchError> {
        let seconds = self.descriptor.command_timeout_secs();
        let round_trip = async {
            if chunk.finalizable {
                conn.query_multiple(&chunk.sql, chunk.kind, &chunk.parameters)
                    .await
                    .map(ChunkOutput::Reader)
            } else {
                conn.execute(&chunk.sql, chunk.kind, &chunk.parameters)
                    .await
                    .map(ChunkOutput::NonQuery)
            }
        };

        // A zero timeout means wait indefinitely.
        if seconds == 0 {
            return round_trip.await;
        }
        let finished = tokio::time::timeout(self.descriptor.command_timeout(), round_trip).await;
        match finished {
            Ok(result) => result,
            Err(_) => {
                conn.cancel();
                Err(SqlBatchError::Timeout { seconds })
            }
        }
    }
}

async fn rollback(conn: &mut dyn DbConnection, cause: &SqlBatchError) {
    tracing::warn!(error = %cause, "rolling back batch transaction");
    if let Err(err) = conn.rollback().await {
        tracing::warn!(%err, "rollback failed");
    }
}

impl fmt::Display for Batch {
    /// The SQL each chunk would send, parameters inlined as literals.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.plan().iter().map(Chunk::to_display_string).collect();
        f.write_str(&rendered.join(STATEMENT_SEPARATOR))
    }
}
