use std::collections::HashMap;
use std::sync::Arc;

use super::convert::FromRowValue;
use crate::error::SqlBatchError;
use crate::types::RowValues;

/// Lower-cased column name to position; the first column with a given name wins.
pub(crate) type ColumnIndex = Arc<HashMap<String, usize>>;

pub(crate) fn build_column_index(column_names: &[String]) -> ColumnIndex {
    let mut map = HashMap::with_capacity(column_names.len());
    for (i, name) in column_names.iter().enumerate() {
        map.entry(name.to_lowercase()).or_insert(i);
    }
    Arc::new(map)
}

/// A row from a database query result
///
/// Column order is the order reported by the driver. Lookups by name are case-insensitive;
/// when a result carries the same column name twice, the first one is returned.
#[derive(Debug, Clone)]
pub struct CustomDbRow {
    /// The column names for this row (shared across all rows in a result set)
    pub column_names: Arc<Vec<String>>,
    /// The values for this row
    pub rows: Vec<RowValues>,
    #[doc(hidden)]
    pub(crate) column_index_cache: ColumnIndex,
}

impl CustomDbRow {
    /// Create a new database row
    ///
    /// # Arguments
    ///
    /// * `column_names` - The column names
    /// * `rows` - The values for this row
    #[must_use]
    pub fn new(column_names: Arc<Vec<String>>, rows: Vec<RowValues>) -> Self {
        let cache = build_column_index(&column_names);
        Self {
            column_names,
            rows,
            column_index_cache: cache,
        }
    }

    /// Get the index of a column by name, ignoring ASCII case.
    #[must_use]
    pub fn get_column_index(&self, column_name: &str) -> Option<usize> {
        if let Some(&idx) = self.column_index_cache.get(column_name) {
            return Some(idx);
        }
        self.column_index_cache
            .get(&column_name.to_lowercase())
            .copied()
    }

    /// Get a value from the row by column name
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&RowValues> {
        self.get_column_index(column_name)
            .and_then(|idx| self.rows.get(idx))
    }

    /// Get a value from the row by column index
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&RowValues> {
        self.rows.get(index)
    }

    /// Typed column access.
    ///
    /// Returns `default` when the column is missing, NULL, or holds a value that does not
    /// convert to `T`.
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use sql_batch::prelude::*;
    ///
    /// let row = CustomDbRow::new(
    ///     Arc::new(vec!["Id".to_string(), "Name".to_string()]),
    ///     vec![RowValues::Int(7), RowValues::Null],
    /// );
    /// assert_eq!(row.get_column::<i64>("id", 0), 7);
    /// assert_eq!(row.get_column("name", "n/a".to_string()), "n/a");
    /// ```
    #[must_use]
    pub fn get_column<T: FromRowValue>(&self, column_name: &str, default: T) -> T {
        self.get(column_name)
            .and_then(T::from_row_value)
            .unwrap_or(default)
    }

    /// Typed column access that reports why a value could not be produced.
    ///
    /// # Errors
    /// Returns `SqlBatchError::ConversionError` when the column is missing or the value does not
    /// convert to `T`.
    pub fn try_get<T: FromRowValue>(&self, column_name: &str) -> Result<T, SqlBatchError> {
        let value = self.get(column_name).ok_or_else(|| {
            SqlBatchError::ConversionError(format!("no column named {column_name}"))
        })?;
        T::from_row_value(value).ok_or_else(|| {
            SqlBatchError::ConversionError(format!(
                "column {column_name} holds {value:?}, which does not convert to {}",
                std::any::type_name::<T>()
            ))
        })
    }

    /// Number of columns in the row.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Explicit, opt-in projection of a row into a caller-defined struct.
///
/// ```rust
/// use sql_batch::prelude::*;
///
/// struct User {
///     id: i64,
///     name: String,
/// }
///
/// impl FromRow for User {
///     fn from_row(row: &CustomDbRow) -> Result<Self, SqlBatchError> {
///         Ok(User {
///             id: row.try_get("id")?,
///             name: row.try_get("name")?,
///         })
///     }
/// }
/// # let _ = |rs: &ResultSet| rs.project::<User>();
/// ```
pub trait FromRow: Sized {
    /// Build `Self` from one row.
    ///
    /// # Errors
    /// Implementations return `SqlBatchError::ConversionError` when a column is missing or has
    /// the wrong shape.
    fn from_row(row: &CustomDbRow) -> Result<Self, SqlBatchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> CustomDbRow {
        CustomDbRow::new(
            Arc::new(vec!["ID".into(), "name".into(), "Name".into()]),
            vec![
                RowValues::Int(3),
                RowValues::Text("first".into()),
                RowValues::Text("second".into()),
            ],
        )
    }

    #[test]
    fn lookup_ignores_case() {
        let row = row();
        assert_eq!(row.get("id"), Some(&RowValues::Int(3)));
        assert_eq!(row.get("Id"), Some(&RowValues::Int(3)));
    }

    #[test]
    fn duplicate_names_resolve_to_first() {
        let row = row();
        assert_eq!(row.get("NAME").and_then(RowValues::as_text), Some("first"));
        assert_eq!(row.get_by_index(2).and_then(RowValues::as_text), Some("second"));
    }

    #[test]
    fn typed_access_falls_back_to_default() {
        let row = row();
        assert_eq!(row.get_column::<i64>("missing", -1), -1);
        assert_eq!(row.get_column::<i64>("name", -1), -1);
        assert!(row.try_get::<i64>("name").is_err());
    }
}
