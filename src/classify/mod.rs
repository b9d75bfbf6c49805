//! Statement classification: does a command produce rows, and does it need a transaction?
//!
//! Classification is a strategy. [`HeuristicClassifier`] is a cheap keyword/regex check,
//! [`ParserClassifier`] walks the token stream of a T-SQL statement, and
//! [`DefaultClassifier`] combines the two the way the batch engine expects. Callers that need
//! more precision can supply their own [`StatementClassifier`].

mod heuristic;
mod parser;

pub use heuristic::HeuristicClassifier;
pub use parser::ParserClassifier;

use crate::types::CommandKind;

/// Outcome of classifying one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Classification {
    /// The command is expected to return at least one result set.
    pub finalizable: bool,
    /// The command changes data or schema and should run inside a transaction when batched.
    pub transaction_needed: bool,
}

/// Maps raw SQL text to a [`Classification`].
pub trait StatementClassifier: Send + Sync + std::fmt::Debug {
    fn classify(&self, sql: &str, kind: CommandKind, parameter_starter: &str) -> Classification;
}

/// The classifier used unless a descriptor is given another one.
///
/// Non-text commands are finalizable and skip transaction analysis. T-SQL text (starter `@`)
/// that mixes `IF` and `SELECT` is handed to the token walker, since a keyword search cannot
/// tell `IF EXISTS (SELECT ...)` from a statement that returns rows. Everything else uses the
/// heuristic.
#[derive(Debug, Clone, Default)]
pub struct DefaultClassifier {
    heuristic: HeuristicClassifier,
    parser: ParserClassifier,
}

impl DefaultClassifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatementClassifier for DefaultClassifier {
    fn classify(&self, sql: &str, kind: CommandKind, parameter_starter: &str) -> Classification {
        if kind != CommandKind::Text {
            return Classification {
                finalizable: true,
                transaction_needed: false,
            };
        }

        let transaction_needed = HeuristicClassifier::transaction_needed(sql);
        let upper = sql.to_uppercase();
        let finalizable = if parameter_starter == "@" && upper.contains("SELECT ") && upper.contains("IF ") {
            let cheap = HeuristicClassifier::finalizable(sql);
            match self.parser.has_top_level_select(sql) {
                Ok(precise) => {
                    if precise != cheap {
                        tracing::debug!(
                            precise,
                            heuristic = cheap,
                            sql,
                            "statement classifiers disagree; using token walk"
                        );
                    }
                    precise
                }
                Err(err) => {
                    tracing::debug!(%err, sql, "token walk failed; falling back to heuristic");
                    cheap
                }
            }
        } else {
            self.heuristic.classify(sql, kind, parameter_starter).finalizable
        };

        Classification {
            finalizable,
            transaction_needed,
        }
    }
}
