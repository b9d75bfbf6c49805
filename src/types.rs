use std::fmt::Write;

use chrono::NaiveDateTime;
use clap::ValueEnum;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Values that can be stored in a database row or bound as a command parameter.
///
/// The same enum is used for parameters and for result columns so the batch engine never has to
/// branch on driver types:
/// ```rust
/// use sql_batch::prelude::*;
///
/// let params = vec![
///     RowValues::Int(1),
///     RowValues::Text("alice".into()),
///     RowValues::Bool(true),
/// ];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// Unique identifier
    Guid(Uuid),
    /// NULL value
    Null,
    /// JSON value
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl RowValues {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<&bool> {
        if let RowValues::Bool(value) = self {
            return Some(value);
        } else if let Some(i) = self.as_int() {
            if *i == 1 {
                return Some(&true);
            } else if *i == 0 {
                return Some(&false);
            }
        }
        None
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        if let RowValues::Timestamp(value) = self {
            return Some(*value);
        } else if let Some(s) = self.as_text() {
            // Try "YYYY-MM-DD HH:MM:SS"
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Some(dt);
            }
            // Try "YYYY-MM-DD HH:MM:SS.SSS"
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
                return Some(dt);
            }
        }
        None
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            RowValues::Float(value) => Some(*value),
            #[allow(clippy::cast_precision_loss)]
            RowValues::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_guid(&self) -> Option<Uuid> {
        match self {
            RowValues::Guid(value) => Some(*value),
            RowValues::Text(s) => Uuid::parse_str(s).ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let RowValues::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    /// The portable database type a value of this shape binds as.
    #[must_use]
    pub fn infer_db_type(&self) -> DbType {
        match self {
            RowValues::Int(_) => DbType::Int64,
            RowValues::Float(_) => DbType::Double,
            RowValues::Text(_) => DbType::String,
            RowValues::Bool(_) => DbType::Boolean,
            RowValues::Timestamp(_) => DbType::DateTime,
            RowValues::Guid(_) => DbType::Guid,
            RowValues::Null => DbType::Default,
            RowValues::JSON(_) => DbType::Json,
            RowValues::Blob(_) => DbType::Binary,
        }
    }

    /// Render the value as a SQL literal, as used when a command is shown with its
    /// parameters inlined.
    #[must_use]
    pub fn to_sql_literal(&self) -> String {
        match self {
            RowValues::Null => "NULL".to_string(),
            RowValues::Int(i) => i.to_string(),
            RowValues::Float(f) => f.to_string(),
            RowValues::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            RowValues::Text(s) => quote_literal(s),
            RowValues::Timestamp(dt) => quote_literal(&dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
            RowValues::Guid(g) => quote_literal(&g.to_string()),
            RowValues::JSON(j) => quote_literal(&j.to_string()),
            RowValues::Blob(bytes) => {
                let mut out = String::with_capacity(2 + bytes.len() * 2);
                out.push_str("0x");
                for b in bytes {
                    let _ = write!(out, "{b:02X}");
                }
                out
            }
        }
    }
}

fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Portable parameter types, independent of any driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DbType {
    /// Let the driver infer the type (used for untyped NULLs).
    #[default]
    Default,
    String,
    Int32,
    Int64,
    Double,
    Decimal,
    Boolean,
    DateTime,
    Guid,
    Binary,
    Json,
}

/// Direction of a bound parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ParameterDirection {
    #[default]
    Input,
    Output,
    InputOutput,
    ReturnValue,
}

/// What the text of a command names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CommandKind {
    /// Plain SQL text.
    #[default]
    Text,
    /// Name of a stored procedure.
    StoredProcedure,
    /// Name of a table read in full.
    TableDirect,
}

/// The database drivers built into this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum DriverKind {
    /// `SQLite` through rusqlite
    #[cfg(feature = "sqlite")]
    Sqlite,
    /// SQL Server through tiberius
    #[cfg(feature = "mssql")]
    Mssql,
    /// A caller-supplied driver
    Custom,
}
