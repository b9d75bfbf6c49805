//! An in-memory driver that records every round-trip, for exercising the batch engine without
//! a database.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::batch::STATEMENT_TERMINATOR;
use crate::classify::HeuristicClassifier;
use crate::driver::{DbConnection, DbDriver};
use crate::error::SqlBatchError;
use crate::parameter::Parameter;
use crate::results::{CustomDbRow, ResultSet};
use crate::translation::rewrite_placeholders;
use crate::types::{CommandKind, DriverKind, RowValues};

/// Create a test row with the given column names and values.
#[must_use]
pub fn create_test_row(column_names: Vec<String>, values: Vec<RowValues>) -> CustomDbRow {
    CustomDbRow::new(Arc::new(column_names), values)
}

/// Something the recording driver saw.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedEvent {
    Connect,
    Begin,
    Commit,
    Rollback,
    RoundTrip(RoundTrip),
    Cancel,
    Close,
}

/// One physical round-trip.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundTrip {
    pub sql: String,
    pub kind: CommandKind,
    pub parameters: Vec<Parameter>,
    /// Sent as a reader rather than a non-query.
    pub reader: bool,
}

#[derive(Debug, Default)]
struct Recorder {
    events: Vec<RecordedEvent>,
    connect_attempts: u32,
    failing_connects: u32,
    failing_round_trip: Option<usize>,
    round_trips: usize,
    delay: Option<Duration>,
}

/// Driver whose connections answer from the SQL text alone.
///
/// The text is split into statements on `;` the way a database would see them, so merged
/// statements that were not terminated show up as one. A reader round-trip yields one result
/// set per statement that looks like a `SELECT`. Each set has one row with two columns:
/// `value`, the first parameter the statement references (or its position when it references
/// none), and `statement`, the statement with its parameters inlined. A non-query round-trip
/// reports one affected row per statement.
#[derive(Debug, Clone, Default)]
pub struct RecordingDriver {
    recorder: Arc<Mutex<Recorder>>,
}

impl RecordingDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `attempts` connection attempts with a `ConnectionError`.
    #[must_use]
    pub fn fail_connects(self, attempts: u32) -> Self {
        self.lock().failing_connects = attempts;
        self
    }

    /// Fail the round-trip at zero-based position `index` with an `ExecutionError`.
    #[must_use]
    pub fn fail_round_trip(self, index: usize) -> Self {
        self.lock().failing_round_trip = Some(index);
        self
    }

    /// Sleep this long inside every round-trip.
    #[must_use]
    pub fn with_delay(self, delay: Duration) -> Self {
        self.lock().delay = Some(delay);
        self
    }

    #[must_use]
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.lock().events.clone()
    }

    #[must_use]
    pub fn round_trips(&self) -> Vec<RoundTrip> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                RecordedEvent::RoundTrip(rt) => Some(rt.clone()),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn connect_attempts(&self) -> u32 {
        self.lock().connect_attempts
    }

    /// Forget everything recorded so far; injected failures stay armed.
    pub fn reset(&self) {
        let mut recorder = self.lock();
        recorder.events.clear();
        recorder.round_trips = 0;
        recorder.connect_attempts = 0;
    }

    fn lock(&self) -> MutexGuard<'_, Recorder> {
        self.recorder.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl DbDriver for RecordingDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Custom
    }

    fn parameter_prefix(&self) -> &str {
        "@"
    }

    async fn connect(&self, _connection_string: &str) -> Result<Box<dyn DbConnection>, SqlBatchError> {
        let mut recorder = self.lock();
        recorder.connect_attempts += 1;
        if recorder.connect_attempts <= recorder.failing_connects {
            return Err(SqlBatchError::ConnectionError(format!(
                "injected connect failure #{}",
                recorder.connect_attempts
            )));
        }
        recorder.events.push(RecordedEvent::Connect);
        Ok(Box::new(RecordingConnection {
            recorder: Arc::clone(&self.recorder),
        }))
    }
}

struct RecordingConnection {
    recorder: Arc<Mutex<Recorder>>,
}

impl RecordingConnection {
    fn lock(&self) -> MutexGuard<'_, Recorder> {
        self.recorder.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, event: RecordedEvent) {
        self.lock().events.push(event);
    }

    async fn round_trip(&self, sql: &str, kind: CommandKind, params: &[Parameter], reader: bool) -> Result<(), SqlBatchError> {
        let (position, failing, delay) = {
            let mut recorder = self.lock();
            recorder.events.push(RecordedEvent::RoundTrip(RoundTrip {
                sql: sql.to_string(),
                kind,
                parameters: params.to_vec(),
                reader,
            }));
            let position = recorder.round_trips;
            recorder.round_trips += 1;
            (position, recorder.failing_round_trip, recorder.delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if failing == Some(position) {
            return Err(SqlBatchError::ExecutionError(format!("injected failure in round-trip {position}")));
        }
        Ok(())
    }
}

fn statements(sql: &str) -> impl Iterator<Item = &str> {
    sql.split(STATEMENT_TERMINATOR).map(str::trim).filter(|statement| !statement.is_empty())
}

fn echo_result_set(text: &str, position: usize, params: &[Parameter]) -> ResultSet {
    let starter = params.first().map_or("@", Parameter::starter);
    let mut first_value = None;
    let statement = rewrite_placeholders(text, starter, |name| {
        let param = params.iter().find(|p| p.id().eq_ignore_ascii_case(name))?;
        first_value.get_or_insert_with(|| param.value());
        Some(param.to_sql_literal())
    })
    .into_owned();
    let value = first_value.unwrap_or_else(|| RowValues::Int(i64::try_from(position).unwrap_or(i64::MAX)));

    let mut set = ResultSet::with_capacity(1);
    set.set_column_names(Arc::new(vec!["value".to_string(), "statement".to_string()]));
    set.add_row_values(vec![value, RowValues::Text(statement)]);
    set
}

#[async_trait]
impl DbConnection for RecordingConnection {
    async fn begin(&mut self) -> Result<(), SqlBatchError> {
        self.record(RecordedEvent::Begin);
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), SqlBatchError> {
        self.record(RecordedEvent::Commit);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), SqlBatchError> {
        self.record(RecordedEvent::Rollback);
        Ok(())
    }

    async fn query_multiple(
        &mut self,
        sql: &str,
        kind: CommandKind,
        params: &[Parameter],
    ) -> Result<Vec<ResultSet>, SqlBatchError> {
        self.round_trip(sql, kind, params, true).await?;
        if kind != CommandKind::Text {
            return Ok(vec![echo_result_set(sql, 0, params)]);
        }
        Ok(statements(sql)
            .enumerate()
            .filter(|(_, statement)| HeuristicClassifier::finalizable(statement))
            .map(|(i, statement)| echo_result_set(statement, i, params))
            .collect())
    }

    async fn execute(
        &mut self,
        sql: &str,
        kind: CommandKind,
        params: &[Parameter],
    ) -> Result<usize, SqlBatchError> {
        self.round_trip(sql, kind, params, false).await?;
        Ok(statements(sql).count())
    }

    fn cancel(&self) {
        self.record(RecordedEvent::Cancel);
    }

    async fn close(&mut self) -> Result<(), SqlBatchError> {
        self.record(RecordedEvent::Close);
        Ok(())
    }
}
