use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use futures_util::TryStreamExt;
use tiberius::{ColumnData, FromSql, QueryItem, QueryStream};

use crate::error::SqlBatchError;
use crate::results::ResultSet;
use crate::types::RowValues;

/// Drain a query stream into one result set per metadata token.
pub(crate) async fn collect_result_sets(mut stream: QueryStream<'_>) -> Result<Vec<ResultSet>, SqlBatchError> {
    let mut sets: Vec<ResultSet> = Vec::new();
    while let Some(item) = stream.try_next().await? {
        match item {
            QueryItem::Metadata(meta) => {
                let column_names: Vec<String> = meta.columns().iter().map(|c| c.name().to_string()).collect();
                let mut result_set = ResultSet::with_capacity(10);
                result_set.set_column_names(Arc::new(column_names));
                sets.push(result_set);
            }
            QueryItem::Row(row) => {
                let result_set = sets.last_mut().ok_or_else(|| {
                    SqlBatchError::ExecutionError("SQL Server sent a row before its column metadata".into())
                })?;
                let row_values = row.into_iter().map(column_to_row_value).collect();
                result_set.add_row_values(row_values);
            }
        }
    }
    Ok(sets)
}

fn column_to_row_value(data: ColumnData<'static>) -> RowValues {
    match data {
        ColumnData::U8(v) => v.map_or(RowValues::Null, |v| RowValues::Int(i64::from(v))),
        ColumnData::I16(v) => v.map_or(RowValues::Null, |v| RowValues::Int(i64::from(v))),
        ColumnData::I32(v) => v.map_or(RowValues::Null, |v| RowValues::Int(i64::from(v))),
        ColumnData::I64(v) => v.map_or(RowValues::Null, RowValues::Int),
        ColumnData::F32(v) => v.map_or(RowValues::Null, |v| RowValues::Float(f64::from(v))),
        ColumnData::F64(v) => v.map_or(RowValues::Null, RowValues::Float),
        ColumnData::Bit(v) => v.map_or(RowValues::Null, RowValues::Bool),
        ColumnData::String(v) => v.map_or(RowValues::Null, |s| RowValues::Text(s.into_owned())),
        ColumnData::Guid(v) => v.map_or(RowValues::Null, RowValues::Guid),
        ColumnData::Binary(v) => v.map_or(RowValues::Null, |b| RowValues::Blob(b.into_owned())),
        ColumnData::Numeric(v) => v.map_or(RowValues::Null, |n| RowValues::Float(f64::from(n))),
        ColumnData::Xml(v) => v.map_or(RowValues::Null, |x| RowValues::Text(x.into_owned().into_string())),
        other => temporal_to_row_value(&other),
    }
}

/// Date and time columns come in several wire shapes; chrono's `FromSql` impls cover them.
fn temporal_to_row_value(data: &ColumnData<'static>) -> RowValues {
    if let Ok(Some(dt)) = NaiveDateTime::from_sql(data) {
        return RowValues::Timestamp(dt);
    }
    if let Ok(Some(date)) = NaiveDate::from_sql(data) {
        return RowValues::Timestamp(date.and_time(NaiveTime::MIN));
    }
    if let Ok(Some(dt)) = DateTime::<Utc>::from_sql(data) {
        return RowValues::Timestamp(dt.naive_utc());
    }
    if let Ok(Some(time)) = NaiveTime::from_sql(data) {
        return RowValues::Text(time.format("%H:%M:%S%.f").to_string());
    }
    RowValues::Null
}

pub(crate) fn convert_affected_rows(total: u64) -> Result<usize, SqlBatchError> {
    usize::try_from(total)
        .map_err(|e| SqlBatchError::ExecutionError(format!("Invalid rows affected count: {e}")))
}
