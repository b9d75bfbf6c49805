use sqlparser::dialect::MsSqlDialect;
use sqlparser::tokenizer::{Token, Tokenizer};

use super::{Classification, HeuristicClassifier, StatementClassifier};
use crate::error::SqlBatchError;
use crate::types::CommandKind;

/// Token-level classifier for T-SQL.
///
/// A statement produces rows when a `SELECT` appears at statement level anywhere in the text,
/// including inside `IF ... BEGIN ... END` blocks. `SELECT`s nested in parentheses (subqueries,
/// `EXISTS (...)`), feeding an `INSERT`, or assigning variables (`SELECT @x = ...`) do not count.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParserClassifier;

impl ParserClassifier {
    /// Walk the token stream looking for a row-producing `SELECT`.
    ///
    /// # Errors
    /// Returns `SqlBatchError::Other` when the text cannot be tokenized.
    pub fn has_top_level_select(&self, sql: &str) -> Result<bool, SqlBatchError> {
        let dialect = MsSqlDialect {};
        let tokens = Tokenizer::new(&dialect, sql)
            .tokenize()
            .map_err(|e| SqlBatchError::Other(format!("failed to tokenize statement: {e}")))?;
        let significant: Vec<&Token> = tokens
            .iter()
            .filter(|t| !matches!(t, Token::Whitespace(_)))
            .collect();

        let mut depth = 0usize;
        let mut insert_pending = false;
        for (idx, token) in significant.iter().enumerate() {
            match token {
                Token::LParen => depth += 1,
                Token::RParen => depth = depth.saturating_sub(1),
                Token::SemiColon => insert_pending = false,
                Token::Word(word) if depth == 0 && word.quote_style.is_none() => {
                    match word.value.to_uppercase().as_str() {
                        "INSERT" => insert_pending = true,
                        "VALUES" | "BEGIN" | "END" | "ELSE" | "EXEC" | "EXECUTE" => {
                            insert_pending = false;
                        }
                        "SELECT" => {
                            if insert_pending {
                                insert_pending = false;
                            } else if !is_variable_assignment(&significant[idx + 1..]) {
                                return Ok(true);
                            }
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }
        Ok(false)
    }
}

/// `SELECT @x = ...` assigns instead of returning rows.
fn is_variable_assignment(rest: &[&Token]) -> bool {
    match rest {
        [Token::Word(w), Token::Eq, ..] => w.value.starts_with('@'),
        [Token::AtSign, Token::Word(_), Token::Eq, ..] => true,
        _ => false,
    }
}

impl StatementClassifier for ParserClassifier {
    fn classify(&self, sql: &str, kind: CommandKind, _parameter_starter: &str) -> Classification {
        if kind != CommandKind::Text {
            return Classification {
                finalizable: true,
                transaction_needed: false,
            };
        }
        let finalizable = self
            .has_top_level_select(sql)
            .unwrap_or_else(|_| HeuristicClassifier::finalizable(sql));
        Classification {
            finalizable,
            transaction_needed: HeuristicClassifier::transaction_needed(sql),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn top_level(sql: &str) -> bool {
        ParserClassifier.has_top_level_select(sql).unwrap()
    }

    #[test]
    fn select_inside_if_block() {
        assert!(top_level(
            "IF NOT EXISTS (SELECT 1 FROM dbo.T WHERE Id = @0)\nBEGIN\n  SELECT 'missing' AS State\nEND"
        ));
    }

    #[test]
    fn exists_subquery_is_not_a_result() {
        assert!(!top_level(
            "IF EXISTS (SELECT 1 FROM dbo.T WHERE Id = @0) BEGIN DELETE FROM dbo.T WHERE Id = @0 END"
        ));
    }

    #[test]
    fn insert_select_is_not_a_result() {
        assert!(!top_level("IF @a = 1 INSERT INTO t (a) SELECT a FROM s"));
        assert!(top_level("INSERT INTO t VALUES (1); SELECT * FROM t"));
    }

    #[test]
    fn variable_assignment_is_not_a_result() {
        assert!(!top_level("IF @a = 1 BEGIN SELECT @b = COUNT(*) FROM t END"));
    }

    #[test]
    fn else_branch_counts() {
        assert!(top_level("IF @a = 1 BEGIN UPDATE t SET a = 1 END ELSE SELECT * FROM t"));
    }

    #[test]
    fn strings_and_comments_are_ignored() {
        assert!(!top_level("IF @a = 1 PRINT 'SELECT 1' -- SELECT 2"));
    }
}
