//! Placeholder rewriting over SQL text.
//!
//! Every rewrite walks the text with a small state machine so that quoted strings, bracketed
//! identifiers and comments are left alone.

use std::borrow::Cow;

mod parsers;
mod scanner;

use parsers::{is_block_comment_end, is_block_comment_start, is_line_comment_start, placeholder_at};
use scanner::State;

use crate::parameter::Parameter;

/// Replace placeholders that start with `starter`.
///
/// `replace` receives each placeholder name (without the starter) and returns its replacement
/// text, or `None` to leave it untouched. Returns a borrowed `Cow` when nothing changed.
pub fn rewrite_placeholders<'a, F>(sql: &'a str, starter: &str, mut replace: F) -> Cow<'a, str>
where
    F: FnMut(&str) -> Option<String>,
{
    if starter.is_empty() {
        return Cow::Borrowed(sql);
    }

    let bytes = sql.as_bytes();
    let starter_bytes = starter.as_bytes();
    let mut out: Option<String> = None;
    let mut copied = 0;
    let mut state = State::Normal;
    let mut idx = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => match b {
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                b'[' => state = State::Bracketed,
                _ if is_line_comment_start(bytes, idx) => {
                    state = State::LineComment;
                    idx += 1;
                }
                _ if is_block_comment_start(bytes, idx) => {
                    state = State::BlockComment(1);
                    idx += 1;
                }
                _ => {
                    if let Some(name_end) = placeholder_at(bytes, idx, starter_bytes) {
                        let name = &sql[idx + starter.len()..name_end];
                        if let Some(replacement) = replace(name) {
                            let buf =
                                out.get_or_insert_with(|| String::with_capacity(sql.len() + 16));
                            buf.push_str(&sql[copied..idx]);
                            buf.push_str(&replacement);
                            copied = name_end;
                        }
                        idx = name_end;
                        continue;
                    }
                }
            },
            State::SingleQuoted => {
                if b == b'\'' {
                    if bytes.get(idx + 1) == Some(&b'\'') {
                        idx += 1; // skip escaped quote
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::DoubleQuoted => {
                if b == b'"' {
                    if bytes.get(idx + 1) == Some(&b'"') {
                        idx += 1; // skip escaped quote
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::Bracketed => {
                if b == b']' {
                    if bytes.get(idx + 1) == Some(&b']') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if is_block_comment_start(bytes, idx) {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                } else if is_block_comment_end(bytes, idx) {
                    state = if depth == 1 {
                        State::Normal
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    idx += 1;
                }
            }
        }
        idx += 1;
    }

    match out {
        Some(mut buf) => {
            buf.push_str(&sql[copied..]);
            Cow::Owned(buf)
        }
        None => Cow::Borrowed(sql),
    }
}

/// Append `suffix` to every placeholder naming one of `ids`.
///
/// Names match without regard to ASCII case and are re-emitted with the declared id, so the
/// rewritten text lines up with parameters copied through [`Parameter::create_copy`].
#[must_use]
pub fn suffix_placeholders<'a>(
    sql: &'a str,
    starter: &str,
    ids: &[&str],
    suffix: &str,
) -> Cow<'a, str> {
    if suffix.is_empty() || ids.is_empty() {
        return Cow::Borrowed(sql);
    }
    rewrite_placeholders(sql, starter, |name| {
        ids.iter()
            .find(|id| id.eq_ignore_ascii_case(name))
            .map(|id| format!("{starter}{id}{suffix}"))
    })
}

/// Replace every placeholder naming one of `params` with the parameter's SQL literal.
#[must_use]
pub fn inline_literals<'a>(sql: &'a str, starter: &str, params: &[Parameter]) -> Cow<'a, str> {
    rewrite_placeholders(sql, starter, |name| {
        params
            .iter()
            .find(|p| p.id().eq_ignore_ascii_case(name))
            .map(Parameter::to_sql_literal)
    })
}

/// Translate named placeholders into positional ones: the placeholder for `params[i]` becomes
/// `positional_prefix + (i + 1)`.
#[must_use]
pub fn to_positional<'a>(
    sql: &'a str,
    starter: &str,
    params: &[Parameter],
    positional_prefix: &str,
) -> Cow<'a, str> {
    rewrite_placeholders(sql, starter, |name| {
        params
            .iter()
            .position(|p| p.id().eq_ignore_ascii_case(name))
            .map(|pos| format!("{positional_prefix}{}", pos + 1))
    })
}
