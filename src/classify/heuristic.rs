use std::sync::LazyLock;

use regex::Regex;

use super::{Classification, StatementClassifier};
use crate::types::CommandKind;

static SELECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:^|\s)SELECT\s").expect("SELECT pattern is valid"));

const MUTATING_KEYWORDS: [&str; 7] = ["INSERT", "UPDATE", "DELETE", "INTO", "DROP", "CREATE", "ALTER"];
const NON_TRANSACTABLE: [&str; 2] = ["CREATE DATABASE", "ALTER DATABASE"];

/// Keyword and regex classification.
///
/// Keyword search is substring based, so an alias called `MINTO` counts as `INTO`. Callers that
/// need better than that should use a parser-backed classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicClassifier;

impl HeuristicClassifier {
    /// Text starts with `SELECT ` or contains ` SELECT ` (any case, any whitespace).
    #[must_use]
    pub fn finalizable(sql: &str) -> bool {
        SELECT_RE.is_match(sql)
    }

    /// Text mentions a data or schema changing keyword and is not database-level DDL.
    #[must_use]
    pub fn transaction_needed(sql: &str) -> bool {
        let upper = sql.to_uppercase();
        MUTATING_KEYWORDS.iter().any(|k| upper.contains(k))
            && !Self::is_non_transactable(&upper)
    }

    /// `CREATE DATABASE` / `ALTER DATABASE` must run outside a transaction.
    #[must_use]
    pub fn is_non_transactable(sql: &str) -> bool {
        let upper = sql.to_uppercase();
        NON_TRANSACTABLE.iter().any(|k| upper.contains(k))
    }
}

impl StatementClassifier for HeuristicClassifier {
    fn classify(&self, sql: &str, kind: CommandKind, _parameter_starter: &str) -> Classification {
        if kind != CommandKind::Text {
            return Classification {
                finalizable: true,
                transaction_needed: false,
            };
        }
        Classification {
            finalizable: Self::finalizable(sql),
            transaction_needed: Self::transaction_needed(sql),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_forms() {
        assert!(HeuristicClassifier::finalizable("select a from t"));
        assert!(HeuristicClassifier::finalizable("WITH x AS (SELECT 1) SELECT * FROM x"));
        assert!(HeuristicClassifier::finalizable("SET NOCOUNT ON;\nSELECT\t1"));
        assert!(!HeuristicClassifier::finalizable("UPDATE t SET a = 1"));
        assert!(!HeuristicClassifier::finalizable("SELECT(1)"));
    }

    #[test]
    fn mutating_statements_need_transactions() {
        for sql in [
            "INSERT INTO t VALUES (1)",
            "update t set a = 1",
            "DELETE FROM t",
            "SELECT * INTO t2 FROM t",
            "DROP TABLE t",
            "CREATE TABLE t (a INT)",
            "ALTER TABLE t ADD b INT",
        ] {
            assert!(HeuristicClassifier::transaction_needed(sql), "{sql}");
        }
    }

    #[test]
    fn database_ddl_stays_outside_transactions() {
        assert!(!HeuristicClassifier::transaction_needed("CREATE DATABASE x"));
        assert!(!HeuristicClassifier::transaction_needed(
            "ALTER DATABASE x SET SINGLE_USER WITH ROLLBACK IMMEDIATE; DROP DATABASE x"
        ));
    }

    #[test]
    fn substring_matching_is_accepted() {
        // MINTO contains INTO
        assert!(HeuristicClassifier::transaction_needed("SELECT a AS MINTO FROM t"));
    }
}
