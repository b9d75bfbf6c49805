//! Named, typed, directional values bound to SQL placeholders.

use std::hash::{Hash, Hasher};

use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::types::{DbType, ParameterDirection, RowValues};

/// Placeholder prefix used when a parameter is built without a driver in sight.
pub const DEFAULT_PARAMETER_STARTER: &str = "@";

/// The value carried by a [`Parameter`].
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// A value bound with the parameter's `DbType`.
    Typed(RowValues),
    /// A string-typed value; `None` is a NULL string.
    StringTyped(Option<String>),
}

/// A named, typed, directional value bound to a SQL placeholder.
///
/// The `id` never contains the placeholder prefix; [`Parameter::placeholder`] renders
/// `starter + id`.
#[derive(Debug, Clone)]
pub struct Parameter {
    id: String,
    db_type: DbType,
    direction: ParameterDirection,
    value: ParamValue,
    starter: String,
    starter_chosen: bool,
    size: Option<usize>,
}

impl Parameter {
    /// A parameter bound with an explicit database type.
    pub fn typed(id: impl Into<String>, value: RowValues, db_type: DbType) -> Self {
        Self::build(id.into(), db_type, ParamValue::Typed(value))
    }

    /// A string-typed parameter.
    pub fn string(id: impl Into<String>, value: Option<String>) -> Self {
        Self::build(id.into(), DbType::String, ParamValue::StringTyped(value))
    }

    /// A NULL whose type is left to the driver.
    pub fn null(id: impl Into<String>) -> Self {
        Self::build(id.into(), DbType::Default, ParamValue::Typed(RowValues::Null))
    }

    /// Wrap a raw value: text becomes a string-typed parameter, NULL a typed null, anything else
    /// a typed parameter whose `DbType` is inferred from the value.
    pub fn infer(id: impl Into<String>, value: RowValues) -> Self {
        match value {
            RowValues::Null => Self::null(id),
            RowValues::Text(s) => Self::string(id, Some(s)),
            other => {
                let db_type = other.infer_db_type();
                Self::typed(id, other, db_type)
            }
        }
    }

    fn build(id: String, db_type: DbType, value: ParamValue) -> Self {
        let starter = DEFAULT_PARAMETER_STARTER.to_string();
        Self {
            id: strip_starter(&id, &starter),
            db_type,
            direction: ParameterDirection::Input,
            value,
            starter,
            starter_chosen: false,
            size: None,
        }
    }

    #[must_use]
    pub fn with_direction(mut self, direction: ParameterDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Change the placeholder prefix, keeping `id` free of it.
    #[must_use]
    pub fn with_starter(mut self, starter: impl Into<String>) -> Self {
        self.starter = starter.into();
        self.starter_chosen = true;
        self.id = strip_starter(&self.id, &self.starter);
        self
    }

    #[must_use]
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn db_type(&self) -> DbType {
        self.db_type
    }

    #[must_use]
    pub fn direction(&self) -> ParameterDirection {
        self.direction
    }

    #[must_use]
    pub fn param_value(&self) -> &ParamValue {
        &self.value
    }

    #[must_use]
    pub fn starter(&self) -> &str {
        &self.starter
    }

    #[must_use]
    pub fn size(&self) -> Option<usize> {
        self.size
    }

    /// `starter + id`, the text this parameter binds to.
    #[must_use]
    pub fn placeholder(&self) -> String {
        format!("{}{}", self.starter, self.id)
    }

    /// The value handed to a driver.
    #[must_use]
    pub fn value(&self) -> RowValues {
        match &self.value {
            ParamValue::Typed(v) => v.clone(),
            ParamValue::StringTyped(Some(s)) => RowValues::Text(s.clone()),
            ParamValue::StringTyped(None) => RowValues::Null,
        }
    }

    /// The value rendered as a SQL literal.
    #[must_use]
    pub fn to_sql_literal(&self) -> String {
        match &self.value {
            ParamValue::Typed(v) => v.to_sql_literal(),
            ParamValue::StringTyped(Some(s)) => format!("'{}'", s.replace('\'', "''")),
            ParamValue::StringTyped(None) => "NULL".to_string(),
        }
    }

    /// Copy of this parameter with `suffix` appended to its id; type, direction and value are
    /// preserved.
    #[must_use]
    pub fn create_copy(&self, suffix: &str) -> Parameter {
        let mut copy = self.clone();
        copy.id.push_str(suffix);
        copy
    }
}

fn strip_starter(id: &str, starter: &str) -> String {
    if starter.is_empty() {
        id.to_string()
    } else {
        id.trim_start_matches(starter).to_string()
    }
}

impl PartialEq for Parameter {
    fn eq(&self, other: &Self) -> bool {
        self.db_type == other.db_type
            && self.direction == other.direction
            && self.id == other.id
            && self.value == other.value
    }
}

impl Eq for Parameter {}

impl Hash for Parameter {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.db_type.hash(state);
        self.direction.hash(state);
    }
}

/// A positional argument handed to `add_query`.
///
/// Raw values are wrapped into parameters named after their position; a ready-made
/// [`Parameter`] passes through unchanged, except that it picks up the connection's prefix
/// unless one was set with [`Parameter::with_starter`].
#[derive(Debug, Clone)]
pub enum Arg {
    Value(RowValues),
    Param(Parameter),
}

impl Arg {
    /// Turn the argument at `index` into a parameter using `starter` as placeholder prefix.
    #[must_use]
    pub fn into_parameter(self, index: usize, starter: &str) -> Parameter {
        match self {
            Arg::Param(p) if p.starter_chosen => p,
            Arg::Param(p) => p.with_starter(starter),
            Arg::Value(v) => Parameter::infer(index.to_string(), v).with_starter(starter),
        }
    }
}

impl From<Parameter> for Arg {
    fn from(value: Parameter) -> Self {
        Arg::Param(value)
    }
}

impl From<RowValues> for Arg {
    fn from(value: RowValues) -> Self {
        Arg::Value(value)
    }
}

impl<T: Into<RowValues>> From<Option<T>> for Arg {
    fn from(value: Option<T>) -> Self {
        Arg::Value(value.map_or(RowValues::Null, Into::into))
    }
}

macro_rules! row_value_from {
    ($($t:ty => $variant:ident $(via $conv:path)?),* $(,)?) => {
        $(
            impl From<$t> for RowValues {
                fn from(value: $t) -> Self {
                    RowValues::$variant($($conv)?(value))
                }
            }

            impl From<$t> for Arg {
                fn from(value: $t) -> Self {
                    Arg::Value(RowValues::from(value))
                }
            }
        )*
    };
}

row_value_from! {
    i64 => Int,
    i32 => Int via i64::from,
    u32 => Int via i64::from,
    f64 => Float,
    bool => Bool,
    String => Text,
    &str => Text via str::to_string,
    NaiveDateTime => Timestamp,
    Uuid => Guid,
    Vec<u8> => Blob,
    JsonValue => JSON,
}

/// Build a `Vec<Arg>` from heterogeneous values.
///
/// ```rust
/// use sql_batch::prelude::*;
///
/// let args = args![1, "two", None::<i64>, Parameter::string("name", Some("x".into()))];
/// assert_eq!(args.len(), 4);
/// ```
#[macro_export]
macro_rules! args {
    () => { ::std::vec::Vec::<$crate::Arg>::new() };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::Arg::from($value)),+]
    };
}
