use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::types::RowValues;

/// Conversion from a column value into a Rust type.
///
/// `None` means the value is NULL or does not have a compatible shape.
pub trait FromRowValue: Sized {
    fn from_row_value(value: &RowValues) -> Option<Self>;
}

impl FromRowValue for RowValues {
    fn from_row_value(value: &RowValues) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromRowValue for i64 {
    fn from_row_value(value: &RowValues) -> Option<Self> {
        match value {
            RowValues::Int(i) => Some(*i),
            RowValues::Bool(b) => Some(i64::from(*b)),
            RowValues::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl FromRowValue for i32 {
    fn from_row_value(value: &RowValues) -> Option<Self> {
        i64::from_row_value(value).and_then(|i| i32::try_from(i).ok())
    }
}

impl FromRowValue for u64 {
    fn from_row_value(value: &RowValues) -> Option<Self> {
        i64::from_row_value(value).and_then(|i| u64::try_from(i).ok())
    }
}

impl FromRowValue for f64 {
    fn from_row_value(value: &RowValues) -> Option<Self> {
        match value {
            RowValues::Text(s) => s.trim().parse().ok(),
            other => other.as_float(),
        }
    }
}

impl FromRowValue for bool {
    fn from_row_value(value: &RowValues) -> Option<Self> {
        value.as_bool().copied()
    }
}

impl FromRowValue for String {
    fn from_row_value(value: &RowValues) -> Option<Self> {
        match value {
            RowValues::Null | RowValues::Blob(_) => None,
            RowValues::Text(s) => Some(s.clone()),
            RowValues::Int(i) => Some(i.to_string()),
            RowValues::Float(f) => Some(f.to_string()),
            RowValues::Bool(b) => Some(b.to_string()),
            RowValues::Timestamp(dt) => Some(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
            RowValues::Guid(g) => Some(g.to_string()),
            RowValues::JSON(j) => Some(j.to_string()),
        }
    }
}

impl FromRowValue for NaiveDateTime {
    fn from_row_value(value: &RowValues) -> Option<Self> {
        value.as_timestamp()
    }
}

impl FromRowValue for Uuid {
    fn from_row_value(value: &RowValues) -> Option<Self> {
        value.as_guid()
    }
}

impl FromRowValue for Vec<u8> {
    fn from_row_value(value: &RowValues) -> Option<Self> {
        value.as_blob().map(<[u8]>::to_vec)
    }
}

impl FromRowValue for JsonValue {
    fn from_row_value(value: &RowValues) -> Option<Self> {
        match value {
            RowValues::JSON(j) => Some(j.clone()),
            RowValues::Text(s) => serde_json::from_str(s).ok(),
            _ => None,
        }
    }
}

impl<T: FromRowValue> FromRowValue for Option<T> {
    fn from_row_value(value: &RowValues) -> Option<Self> {
        if value.is_null() {
            Some(None)
        } else {
            T::from_row_value(value).map(Some)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_text_converts() {
        assert_eq!(i64::from_row_value(&RowValues::Text(" 42 ".into())), Some(42));
        assert_eq!(f64::from_row_value(&RowValues::Int(2)), Some(2.0));
    }

    #[test]
    fn null_is_none_unless_optional() {
        assert_eq!(i64::from_row_value(&RowValues::Null), None);
        assert_eq!(Option::<i64>::from_row_value(&RowValues::Null), Some(None));
    }

    #[test]
    fn narrowing_rejects_overflow() {
        assert_eq!(i32::from_row_value(&RowValues::Int(i64::MAX)), None);
    }
}
