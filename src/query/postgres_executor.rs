//! `QueryExecutor` over the relational-A dialect, backed by the `postgres`
//! crate's synchronous client.

use chrono::{DateTime, Utc};
use postgres::types::{Json, ToSql};
use postgres::{Client, NoTls};

use crate::config::DbDialect;
use crate::error::{PkdError, PkdResult};
use crate::query::dialect::rewrite_placeholders;
use crate::query::{QueryExecutor, QueryRow, SqlValue};

pub struct PostgresExecutor {
    client: Client,
}

impl PostgresExecutor {
    pub fn connect(host: &str, port: u16, name: &str, user: &str, password: &str) -> PkdResult<Self> {
        let conn_str =
            format!("host={host} port={port} dbname={name} user={user} password={password}");
        let client = Client::connect(&conn_str, NoTls)
            .map_err(|e| PkdError::Database(format!("postgres connect failed: {e}")))?;
        Ok(PostgresExecutor { client })
    }

    /// Cheap liveness probe used by the pool's health check on checkout.
    pub fn ping(&mut self) -> bool {
        self.client.simple_query("SELECT 1").is_ok()
    }
}

fn to_sql_params(params: &[SqlValue]) -> Vec<Box<dyn ToSql + Sync>> {
    params
        .iter()
        .map(|value| -> Box<dyn ToSql + Sync> {
            match value {
                SqlValue::Null => Box::new(Option::<String>::None),
                SqlValue::Bool(b) => Box::new(*b),
                SqlValue::Int(n) => Box::new(*n),
                SqlValue::Text(s) => Box::new(s.clone()),
                SqlValue::Bytes(b) => Box::new(b.clone()),
                SqlValue::Timestamp(t) => Box::new(*t),
                SqlValue::Json(v) => Box::new(Json(v.clone())),
            }
        })
        .collect()
}

fn row_to_query_row(row: &postgres::Row) -> QueryRow {
    let mut columns = std::collections::BTreeMap::new();
    for (i, column) in row.columns().iter().enumerate() {
        let name = column.name().to_string();
        let value = match column.type_().name() {
            "bool" => row.try_get::<_, Option<bool>>(i).ok().flatten().map(SqlValue::Bool),
            "int4" | "int8" => row.try_get::<_, Option<i64>>(i).ok().flatten().map(SqlValue::Int),
            "bytea" => row
                .try_get::<_, Option<Vec<u8>>>(i)
                .ok()
                .flatten()
                .map(SqlValue::Bytes),
            "timestamptz" | "timestamp" => row
                .try_get::<_, Option<DateTime<Utc>>>(i)
                .ok()
                .flatten()
                .map(SqlValue::Timestamp),
            "json" | "jsonb" => row
                .try_get::<_, Option<Json<serde_json::Value>>>(i)
                .ok()
                .flatten()
                .map(|Json(v)| SqlValue::Json(v)),
            _ => row.try_get::<_, Option<String>>(i).ok().flatten().map(SqlValue::Text),
        }
        .unwrap_or(SqlValue::Null);
        columns.insert(name, value);
    }
    QueryRow { columns }
}

impl QueryExecutor for PostgresExecutor {
    fn query(&mut self, sql: &str, params: &[SqlValue]) -> PkdResult<Vec<QueryRow>> {
        let rewritten = rewrite_placeholders(sql, DbDialect::A);
        let bound = to_sql_params(params);
        let refs: Vec<&(dyn ToSql + Sync)> = bound.iter().map(|b| b.as_ref()).collect();
        let rows = self
            .client
            .query(&rewritten, &refs)
            .map_err(|e| PkdError::Database(e.to_string()))?;
        Ok(rows.iter().map(row_to_query_row).collect())
    }

    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> PkdResult<u64> {
        let rewritten = rewrite_placeholders(sql, DbDialect::A);
        let bound = to_sql_params(params);
        let refs: Vec<&(dyn ToSql + Sync)> = bound.iter().map(|b| b.as_ref()).collect();
        self.client
            .execute(&rewritten, &refs)
            .map_err(|e| PkdError::Database(e.to_string()))
    }

    fn transaction(
        &mut self,
        body: &mut dyn FnMut(&mut dyn QueryExecutor) -> PkdResult<()>,
    ) -> PkdResult<()> {
        let mut txn = self
            .client
            .transaction()
            .map_err(|e| PkdError::Database(format!("begin transaction failed: {e}")))?;
        let mut scoped = PostgresTransactionExecutor { txn: &mut txn };
        let result = body(&mut scoped);
        match result {
            Ok(()) => txn
                .commit()
                .map_err(|e| PkdError::Database(format!("commit failed: {e}"))),
            Err(e) => {
                let _ = txn.rollback();
                Err(e)
            }
        }
    }
}

struct PostgresTransactionExecutor<'a> {
    txn: &'a mut postgres::Transaction<'a>,
}

impl<'a> QueryExecutor for PostgresTransactionExecutor<'a> {
    fn query(&mut self, sql: &str, params: &[SqlValue]) -> PkdResult<Vec<QueryRow>> {
        let rewritten = rewrite_placeholders(sql, DbDialect::A);
        let bound = to_sql_params(params);
        let refs: Vec<&(dyn ToSql + Sync)> = bound.iter().map(|b| b.as_ref()).collect();
        let rows = self
            .txn
            .query(&rewritten, &refs)
            .map_err(|e| PkdError::Database(e.to_string()))?;
        Ok(rows.iter().map(row_to_query_row).collect())
    }

    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> PkdResult<u64> {
        let rewritten = rewrite_placeholders(sql, DbDialect::A);
        let bound = to_sql_params(params);
        let refs: Vec<&(dyn ToSql + Sync)> = bound.iter().map(|b| b.as_ref()).collect();
        self.txn
            .execute(&rewritten, &refs)
            .map_err(|e| PkdError::Database(e.to_string()))
    }

    fn transaction(
        &mut self,
        _body: &mut dyn FnMut(&mut dyn QueryExecutor) -> PkdResult<()>,
    ) -> PkdResult<()> {
        Err(PkdError::Database(
            "nested transactions are not supported".to_string(),
        ))
    }
}
