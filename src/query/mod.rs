//! Dialect-abstracted query execution (spec §4.2). Repositories speak one
//! small trait; the two supported relational backends each implement it by
//! rewriting placeholders and value encodings to match their own wire
//! format. Everything here is synchronous, blocking I/O — the teacher's
//! codebase is thread-per-task, not async, and this keeps that shape.

pub mod dialect;
pub mod oracle_executor;
pub mod postgres_executor;

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::error::PkdResult;

/// A single bound parameter, dialect-neutral. Each executor converts these
/// into its own driver's parameter type at the call boundary.
#[derive(Debug, Clone)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
    /// A JSON-column field (spec §6: "JSON-column fields use native JSON
    /// type on one dialect and plain string on the other with equivalent
    /// application-side handling"). Relational-A binds this through the
    /// driver's native `json`/`jsonb` support; relational-B serialises it
    /// to text, since it has no JSON column type at all.
    Json(serde_json::Value),
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

/// One result row, addressed by column name to stay driver-agnostic.
#[derive(Debug, Clone, Default)]
pub struct QueryRow {
    pub columns: BTreeMap<String, SqlValue>,
}

impl QueryRow {
    pub fn text(&self, column: &str) -> Option<&str> {
        match self.columns.get(column) {
            Some(SqlValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn int(&self, column: &str) -> Option<i64> {
        match self.columns.get(column) {
            Some(SqlValue::Int(n)) => Some(*n),
            _ => None,
        }
    }

    /// Relational-B has no native boolean column type (the dialect encodes
    /// one as `NUMBER(1)`), so a bare integer 0/1 is accepted here too, not
    /// just a genuine `SqlValue::Bool`.
    pub fn bool(&self, column: &str) -> Option<bool> {
        match self.columns.get(column) {
            Some(SqlValue::Bool(b)) => Some(*b),
            Some(SqlValue::Int(n)) => Some(*n != 0),
            _ => None,
        }
    }

    pub fn timestamp(&self, column: &str) -> Option<DateTime<Utc>> {
        match self.columns.get(column) {
            Some(SqlValue::Timestamp(t)) => Some(*t),
            _ => None,
        }
    }

    pub fn bytes(&self, column: &str) -> Option<&[u8]> {
        match self.columns.get(column) {
            Some(SqlValue::Bytes(b)) => Some(b.as_slice()),
            _ => None,
        }
    }

    /// Reads a JSON-column field regardless of which dialect produced it:
    /// relational-A reports it as `SqlValue::Json` directly, relational-B
    /// reports it as plain text that still needs parsing.
    pub fn json(&self, column: &str) -> Option<serde_json::Value> {
        match self.columns.get(column) {
            Some(SqlValue::Json(v)) => Some(v.clone()),
            Some(SqlValue::Text(s)) => serde_json::from_str(s).ok(),
            _ => None,
        }
    }
}

/// The one surface repositories depend on. Queries are written once using
/// `?` placeholders and dialect-neutral SQL; each executor rewrites them
/// via [`dialect`] before handing off to its own driver.
pub trait QueryExecutor: Send {
    fn query(&mut self, sql: &str, params: &[SqlValue]) -> PkdResult<Vec<QueryRow>>;
    /// Returns the number of affected rows.
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> PkdResult<u64>;
    /// Runs `body` inside a transaction, committing on `Ok` and rolling
    /// back on `Err`.
    fn transaction(
        &mut self,
        body: &mut dyn FnMut(&mut dyn QueryExecutor) -> PkdResult<()>,
    ) -> PkdResult<()>;
}
