//! `QueryExecutor` over the relational-B dialect, backed by the `oracle`
//! crate's synchronous client.

use chrono::{DateTime, Utc};
use oracle::sql_type::{OracleType, ToSql};
use oracle::Connection;

use crate::config::DbDialect;
use crate::error::{PkdError, PkdResult};
use crate::query::dialect::rewrite_placeholders;
use crate::query::{QueryExecutor, QueryRow, SqlValue};

pub struct OracleExecutor {
    connection: Connection,
}

impl OracleExecutor {
    pub fn connect(host: &str, port: u16, name: &str, user: &str, password: &str) -> PkdResult<Self> {
        let connect_string = format!("{host}:{port}/{name}");
        let connection = Connection::connect(user, password, &connect_string)
            .map_err(|e| PkdError::Database(format!("oracle connect failed: {e}")))?;
        Ok(OracleExecutor { connection })
    }

    pub fn ping(&mut self) -> bool {
        self.connection.query_row_as::<i64>("SELECT 1 FROM dual", &[]).is_ok()
    }
}

fn to_sql_params(params: &[SqlValue]) -> Vec<Box<dyn ToSql>> {
    params
        .iter()
        .map(|value| -> Box<dyn ToSql> {
            match value {
                SqlValue::Null => Box::new(Option::<String>::None),
                // relational-B has no native boolean; the spec's numeric
                // encoding maps true/false onto NUMBER(1) 1/0.
                SqlValue::Bool(b) => Box::new(if *b { 1i64 } else { 0i64 }),
                SqlValue::Int(n) => Box::new(*n),
                SqlValue::Text(s) => Box::new(s.clone()),
                SqlValue::Bytes(b) => Box::new(b.clone()),
                SqlValue::Timestamp(t) => Box::new(t.to_rfc3339()),
                // relational-B has no JSON column type; the spec's
                // "equivalent application-side handling" means the value
                // is simply serialised to text here, and `QueryRow::json`
                // parses it back out on read regardless of dialect.
                SqlValue::Json(v) => Box::new(serde_json::to_string(v).unwrap_or_default()),
            }
        })
        .collect()
}

/// `NUMBER`/`TIMESTAMP` etc. all get the same `?` placeholder in the
/// dialect-neutral SQL this crate writes, so the only way to recover which
/// [`SqlValue`] variant a column actually holds is the driver-reported
/// `OracleType` of each result column; relational-B has no boolean column
/// type at all (the dialect encodes one as `NUMBER(1)`), so that case is
/// left as a plain integer and reconciled on read by [`QueryRow::bool`].
fn row_to_query_row(row: &oracle::Row) -> PkdResult<QueryRow> {
    let mut columns = std::collections::BTreeMap::new();
    for (i, info) in row.column_info().iter().enumerate() {
        let name = info.name().to_string();
        let value = column_value(row, i, info.oracle_type())
            .map_err(|e| PkdError::Database(e.to_string()))?;
        columns.insert(name, value);
    }
    Ok(QueryRow { columns })
}

fn column_value(row: &oracle::Row, index: usize, oracle_type: &OracleType) -> oracle::Result<SqlValue> {
    let value = match oracle_type {
        OracleType::Number(_, _) | OracleType::Float(_) | OracleType::BinaryFloat | OracleType::BinaryDouble => {
            row.get::<_, Option<i64>>(index)?.map(SqlValue::Int)
        }
        OracleType::Raw(_) | OracleType::BLOB | OracleType::LongRaw => {
            row.get::<_, Option<Vec<u8>>>(index)?.map(SqlValue::Bytes)
        }
        OracleType::Date | OracleType::Timestamp(_) => row
            .get::<_, Option<chrono::NaiveDateTime>>(index)?
            .map(|naive| SqlValue::Timestamp(naive.and_utc())),
        OracleType::TimestampTZ(_) | OracleType::TimestampLTZ(_) => {
            row.get::<_, Option<DateTime<Utc>>>(index)?.map(SqlValue::Timestamp)
        }
        _ => row.get::<_, Option<String>>(index)?.map(SqlValue::Text),
    };
    Ok(value.unwrap_or(SqlValue::Null))
}

impl QueryExecutor for OracleExecutor {
    fn query(&mut self, sql: &str, params: &[SqlValue]) -> PkdResult<Vec<QueryRow>> {
        let rewritten = rewrite_placeholders(sql, DbDialect::B);
        let bound = to_sql_params(params);
        let refs: Vec<&dyn ToSql> = bound.iter().map(|b| b.as_ref()).collect();
        let result_set = self
            .connection
            .query(&rewritten, &refs)
            .map_err(|e| PkdError::Database(e.to_string()))?;
        let mut rows = Vec::new();
        for row in result_set {
            let row = row.map_err(|e| PkdError::Database(e.to_string()))?;
            rows.push(row_to_query_row(&row)?);
        }
        Ok(rows)
    }

    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> PkdResult<u64> {
        let rewritten = rewrite_placeholders(sql, DbDialect::B);
        let bound = to_sql_params(params);
        let refs: Vec<&dyn ToSql> = bound.iter().map(|b| b.as_ref()).collect();
        let stmt_result = self
            .connection
            .execute(&rewritten, &refs)
            .map_err(|e| PkdError::Database(e.to_string()));
        stmt_result?;
        self.connection
            .row_count()
            .map_err(|e| PkdError::Database(e.to_string()))
    }

    fn transaction(
        &mut self,
        body: &mut dyn FnMut(&mut dyn QueryExecutor) -> PkdResult<()>,
    ) -> PkdResult<()> {
        // The `oracle` crate commits/rolls back directly on the connection
        // rather than through a separate transaction handle.
        let result = body(self);
        match result {
            Ok(()) => self
                .connection
                .commit()
                .map_err(|e| PkdError::Database(format!("commit failed: {e}"))),
            Err(e) => {
                let _ = self.connection.rollback();
                Err(e)
            }
        }
    }
}
