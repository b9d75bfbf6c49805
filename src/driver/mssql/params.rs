use std::borrow::Cow;

use chrono::NaiveDateTime;
use tiberius::Query;
use uuid::Uuid;

use crate::error::SqlBatchError;
use crate::parameter::Parameter;
use crate::translation::to_positional;
use crate::types::{CommandKind, DbType, RowValues};

/// Text sent to the server for one chunk: positional placeholders for text commands, an
/// `EXEC` call for stored procedures, `SELECT *` for table names.
///
/// Procedure parameters whose ids are numeric are passed positionally; named ones are
/// passed as `@name = @Pn`.
///
/// # Errors
/// Returns `SqlBatchError::ParameterError` for an empty procedure or table name.
pub fn statement_text<'a>(
    sql: &'a str,
    kind: CommandKind,
    params: &[Parameter],
) -> Result<Cow<'a, str>, SqlBatchError> {
    match kind {
        CommandKind::Text => {
            let starter = params.first().map_or("@", Parameter::starter);
            Ok(to_positional(sql, starter, params, "@P"))
        }
        CommandKind::TableDirect => {
            let table = sql.trim();
            if table.is_empty() {
                return Err(SqlBatchError::ParameterError("empty table name".into()));
            }
            Ok(Cow::Owned(format!("SELECT * FROM {table}")))
        }
        CommandKind::StoredProcedure => {
            let name = sql.trim();
            if name.is_empty() {
                return Err(SqlBatchError::ParameterError("empty procedure name".into()));
            }
            let args: Vec<String> = params
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    if p.id().starts_with(|c: char| c.is_ascii_digit()) {
                        format!("@P{}", i + 1)
                    } else {
                        format!("@{} = @P{}", p.id(), i + 1)
                    }
                })
                .collect();
            if args.is_empty() {
                Ok(Cow::Owned(format!("EXEC {name}")))
            } else {
                Ok(Cow::Owned(format!("EXEC {name} {}", args.join(", "))))
            }
        }
    }
}

/// Bind each parameter in order. NULLs are typed from the parameter's declared `DbType`.
pub(crate) fn bind_params(query: &mut Query<'_>, params: &[Parameter]) {
    for param in params {
        match param.value() {
            RowValues::Int(i) => query.bind(i),
            RowValues::Float(f) => query.bind(f),
            RowValues::Text(s) => query.bind(s),
            RowValues::Bool(b) => query.bind(b),
            RowValues::Timestamp(dt) => query.bind(dt),
            RowValues::Guid(g) => query.bind(g),
            RowValues::JSON(jsval) => query.bind(jsval.to_string()),
            RowValues::Blob(bytes) => query.bind(bytes),
            RowValues::Null => bind_null(query, param.db_type()),
        }
    }
}

fn bind_null(query: &mut Query<'_>, db_type: DbType) {
    match db_type {
        DbType::Int32 | DbType::Int64 => query.bind(Option::<i64>::None),
        DbType::Double | DbType::Decimal => query.bind(Option::<f64>::None),
        DbType::Boolean => query.bind(Option::<bool>::None),
        DbType::DateTime => query.bind(Option::<NaiveDateTime>::None),
        DbType::Guid => query.bind(Option::<Uuid>::None),
        DbType::Binary => query.bind(Option::<Vec<u8>>::None),
        DbType::Default | DbType::String | DbType::Json => query.bind(Option::<String>::None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_uses_positional_placeholders() {
        let params = vec![
            Parameter::infer("0Command1", RowValues::Int(1)),
            Parameter::infer("0Command2", RowValues::Int(2)),
        ];
        let sql = "SELECT * FROM T WHERE ID=@0Command1\nSELECT * FROM T WHERE ID=@0Command2";
        let text = statement_text(sql, CommandKind::Text, &params).unwrap();
        assert_eq!(text, "SELECT * FROM T WHERE ID=@P1\nSELECT * FROM T WHERE ID=@P2");
    }

    #[test]
    fn procedures_become_exec() {
        let params = vec![
            Parameter::infer("CustomerId", RowValues::Int(7)),
            Parameter::infer("Region", RowValues::Text("EU".into())),
        ];
        let text = statement_text("dbo.GetOrders", CommandKind::StoredProcedure, &params).unwrap();
        assert_eq!(text, "EXEC dbo.GetOrders @CustomerId = @P1, @Region = @P2");

        let positional = vec![Parameter::infer("0", RowValues::Int(7))];
        let text = statement_text("dbo.GetOrders", CommandKind::StoredProcedure, &positional).unwrap();
        assert_eq!(text, "EXEC dbo.GetOrders @P1");
    }
}
