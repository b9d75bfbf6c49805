use std::sync::Arc;

use rusqlite::types::Value;
use rusqlite::{Batch, Connection, Statement};

use super::params::{NamedValues, sqlite_value_to_row_value};
use crate::error::SqlBatchError;
use crate::results::ResultSet;

/// Bind every named value the statement declares. Names it does not use are skipped.
fn bind_named(stmt: &mut Statement<'_>, values: &NamedValues) -> Result<(), SqlBatchError> {
    if stmt.parameter_count() == 0 {
        return Ok(());
    }
    for (name, value) in values {
        if let Some(index) = stmt.parameter_index(name)? {
            stmt.raw_bind_parameter(index, value)?;
        }
    }
    Ok(())
}

fn build_result_set(stmt: &mut Statement<'_>) -> Result<ResultSet, SqlBatchError> {
    let column_names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(std::string::ToString::to_string)
        .collect();
    let col_count = column_names.len();

    let mut result_set = ResultSet::with_capacity(10);
    result_set.set_column_names(Arc::new(column_names));

    let mut rows = stmt.raw_query();
    while let Some(row) = rows.next()? {
        let mut row_values = Vec::with_capacity(col_count);
        for i in 0..col_count {
            let value: Value = row.get(i)?;
            row_values.push(sqlite_value_to_row_value(value));
        }
        result_set.add_row_values(row_values);
    }
    Ok(result_set)
}

/// Walk every statement in `sql`, collecting one result set per row-returning statement.
pub(crate) fn query_multiple(
    conn: &Connection,
    sql: &str,
    values: &NamedValues,
) -> Result<Vec<ResultSet>, SqlBatchError> {
    let mut sets = Vec::new();
    let mut batch = Batch::new(conn, sql);
    while let Some(mut stmt) = batch.next()? {
        bind_named(&mut stmt, values)?;
        if stmt.column_count() > 0 {
            sets.push(build_result_set(&mut stmt)?);
        } else {
            stmt.raw_execute()?;
        }
    }
    Ok(sets)
}

/// Walk every statement in `sql`, summing rows changed. Rows returned along the way are drained.
pub(crate) fn execute(conn: &Connection, sql: &str, values: &NamedValues) -> Result<usize, SqlBatchError> {
    let mut affected = 0usize;
    let mut batch = Batch::new(conn, sql);
    while let Some(mut stmt) = batch.next()? {
        bind_named(&mut stmt, values)?;
        if stmt.column_count() > 0 {
            let mut rows = stmt.raw_query();
            while rows.next()?.is_some() {}
        } else {
            affected += stmt.raw_execute()?;
        }
    }
    Ok(affected)
}
