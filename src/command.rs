//! One queued unit of work.

use std::any::Any;
use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::classify::{Classification, StatementClassifier};
use crate::parameter::Parameter;
use crate::results::ResultSet;
use crate::translation::{inline_literals, suffix_placeholders};
use crate::types::CommandKind;

/// Opaque value delivered back to a command's handler with its results.
pub type CallbackContext = Arc<dyn Any + Send + Sync>;

/// Receives the result sets that belong to one command once its batch has executed.
///
/// Closures with the matching signature implement this trait:
/// ```rust
/// use sql_batch::prelude::*;
///
/// let handler = |cmd: &Command, results: &[ResultSet], _ctx: Option<&CallbackContext>| {
///     println!("{} -> {} result set(s)", cmd.sql_text(), results.len());
/// };
/// # fn takes<H: ResultHandler>(_: H) {}
/// # takes(handler);
/// ```
pub trait ResultHandler: Send + Sync {
    fn on_result(&self, command: &Command, results: &[ResultSet], context: Option<&CallbackContext>);
}

impl<F> ResultHandler for F
where
    F: Fn(&Command, &[ResultSet], Option<&CallbackContext>) + Send + Sync,
{
    fn on_result(&self, command: &Command, results: &[ResultSet], context: Option<&CallbackContext>) {
        self(command, results, context);
    }
}

/// A queued SQL statement (or procedure / table name) with its parameters.
///
/// Classification runs once, when the command is built, and is cached.
#[derive(Clone)]
pub struct Command {
    sql_text: String,
    kind: CommandKind,
    parameters: Vec<Parameter>,
    starter: String,
    header: bool,
    classification: Classification,
    handler: Option<Arc<dyn ResultHandler>>,
    context: Option<CallbackContext>,
}

impl Command {
    /// Build and classify a command.
    ///
    /// The first parameter's starter drives classification; `default_starter` is used when the
    /// command has no parameters.
    pub fn new(
        sql_text: impl Into<String>,
        kind: CommandKind,
        parameters: Vec<Parameter>,
        default_starter: &str,
        classifier: &dyn StatementClassifier,
    ) -> Self {
        let sql_text = sql_text.into();
        let starter = parameters
            .first()
            .map_or_else(|| default_starter.to_string(), |p| p.starter().to_string());
        let classification = classifier.classify(&sql_text, kind, &starter);
        Self {
            sql_text,
            kind,
            parameters,
            starter,
            header: false,
            classification,
            handler: None,
            context: None,
        }
    }

    /// Mark this command as a header, replayed into every physical chunk.
    #[must_use]
    pub fn into_header(mut self) -> Self {
        self.header = true;
        self
    }

    /// Replace the text and kind, classifying again.
    pub fn reassign(
        &mut self,
        sql_text: impl Into<String>,
        kind: CommandKind,
        classifier: &dyn StatementClassifier,
    ) {
        self.sql_text = sql_text.into();
        self.kind = kind;
        self.classification = classifier.classify(&self.sql_text, kind, &self.starter);
    }

    /// Attach the handler that receives this command's result sets.
    pub fn on_result<H: ResultHandler + 'static>(&mut self, handler: H) -> &mut Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Attach the opaque value handed back to the handler.
    pub fn with_context(&mut self, context: CallbackContext) -> &mut Self {
        self.context = Some(context);
        self
    }

    #[must_use]
    pub fn sql_text(&self) -> &str {
        &self.sql_text
    }

    #[must_use]
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    #[must_use]
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    #[must_use]
    pub fn starter(&self) -> &str {
        &self.starter
    }

    #[must_use]
    pub fn is_header(&self) -> bool {
        self.header
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sql_text.trim().is_empty()
    }

    #[must_use]
    pub fn finalizable(&self) -> bool {
        self.classification.finalizable
    }

    #[must_use]
    pub fn transaction_needed(&self) -> bool {
        self.classification.transaction_needed
    }

    #[must_use]
    pub fn classification(&self) -> Classification {
        self.classification
    }

    #[must_use]
    pub fn context(&self) -> Option<&CallbackContext> {
        self.context.as_ref()
    }

    /// Text with every placeholder naming one of this command's parameters suffixed.
    #[must_use]
    pub fn merged_text(&self, suffix: &str) -> Cow<'_, str> {
        if self.kind != CommandKind::Text {
            return Cow::Borrowed(&self.sql_text);
        }
        let ids: Vec<&str> = self.parameters.iter().map(Parameter::id).collect();
        suffix_placeholders(&self.sql_text, &self.starter, &ids, suffix)
    }

    /// Copies of this command's parameters with `suffix` appended to their ids.
    #[must_use]
    pub fn merged_parameters(&self, suffix: &str) -> Vec<Parameter> {
        self.parameters.iter().map(|p| p.create_copy(suffix)).collect()
    }

    /// The text with each parameter inlined as a SQL literal.
    #[must_use]
    pub fn to_display_string(&self) -> String {
        inline_literals(&self.sql_text, &self.starter, &self.parameters).into_owned()
    }

    /// Deliver this command's results to its handler, if it has one.
    pub(crate) fn finalize(&self, results: &[ResultSet]) {
        if let Some(handler) = &self.handler {
            handler.on_result(self, results, self.context.as_ref());
        }
    }
}

impl PartialEq for Command {
    fn eq(&self, other: &Self) -> bool {
        if self.kind != other.kind
            || self.parameters.len() != other.parameters.len()
            || self.sql_text.to_lowercase() != other.sql_text.to_lowercase()
        {
            return false;
        }
        let mine: HashSet<&Parameter> = self.parameters.iter().collect();
        let theirs: HashSet<&Parameter> = other.parameters.iter().collect();
        mine == theirs
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("sql_text", &self.sql_text)
            .field("kind", &self.kind)
            .field("parameters", &self.parameters)
            .field("header", &self.header)
            .field("finalizable", &self.classification.finalizable)
            .field("transaction_needed", &self.classification.transaction_needed)
            .field("has_handler", &self.handler.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::classify::DefaultClassifier;
    use crate::types::RowValues;

    fn command(sql: &str, params: Vec<Parameter>) -> Command {
        Command::new(sql, CommandKind::Text, params, "@", &DefaultClassifier::new())
    }

    #[test]
    fn classification_is_cached_at_construction() {
        let cmd = command("INSERT INTO t VALUES (@0)", vec![Parameter::infer("0", RowValues::Int(1))]);
        assert!(!cmd.finalizable());
        assert!(cmd.transaction_needed());
    }

    #[test]
    fn equality_ignores_case_and_parameter_order() {
        let a = command(
            "select * from t where a = @0 and b = @1",
            vec![Parameter::infer("0", RowValues::Int(1)), Parameter::infer("1", RowValues::Int(2))],
        );
        let b = command(
            "SELECT * FROM T WHERE A = @0 AND B = @1",
            vec![Parameter::infer("1", RowValues::Int(2)), Parameter::infer("0", RowValues::Int(1))],
        );
        assert_eq!(a, b);
        let c = command(
            "SELECT * FROM T WHERE A = @0 AND B = @1",
            vec![Parameter::infer("1", RowValues::Int(3)), Parameter::infer("0", RowValues::Int(1))],
        );
        assert_ne!(a, c);
    }

    #[test]
    fn merged_text_and_parameters_agree() {
        let cmd = command("SELECT @0, @@ROWCOUNT", vec![Parameter::infer("0", RowValues::Int(1))]);
        assert_eq!(cmd.merged_text("Command2"), "SELECT @0Command2, @@ROWCOUNT");
        let params = cmd.merged_parameters("Command2");
        assert_eq!(params[0].id(), "0Command2");
    }

    #[test]
    fn display_inlines_values() {
        let cmd = command("SELECT * FROM T WHERE ID=@0", vec![Parameter::infer("0", RowValues::Int(10))]);
        assert_eq!(cmd.to_display_string(), "SELECT * FROM T WHERE ID=10");
    }

    #[test]
    fn handler_receives_context() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut cmd = command("SELECT 1", Vec::new());
        cmd.on_result(move |_: &Command, results: &[ResultSet], ctx: Option<&CallbackContext>| {
            let tag = ctx.and_then(|c| c.downcast_ref::<&str>()).copied().unwrap_or("none");
            sink.lock().unwrap().push((results.len(), tag));
        })
        .with_context(Arc::new("ctx"));
        cmd.finalize(&[ResultSet::default()]);
        assert_eq!(*seen.lock().unwrap(), vec![(1, "ctx")]);
    }
}
