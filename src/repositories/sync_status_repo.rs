//! Divergence-snapshot persistence (spec §3 `SyncStatusSnapshot`, §4.6).
//! The per-kind and per-country count maps are JSON-column fields (spec
//! §6): bound through [`crate::query::SqlValue::Json`] so the same code
//! path works whether the backing dialect has a native JSON type or not.

use std::collections::HashMap;

use crate::error::PkdResult;
use crate::models::{SyncStatus, SyncStatusSnapshot};
use crate::query::{QueryExecutor, SqlValue};

pub trait SyncStatusRepository {
    fn insert(&self, executor: &mut dyn QueryExecutor, snapshot: &SyncStatusSnapshot) -> PkdResult<()>;
    fn most_recent(&self, executor: &mut dyn QueryExecutor) -> PkdResult<Option<SyncStatusSnapshot>>;
}

pub struct SqlSyncStatusRepository;

fn status_str(status: SyncStatus) -> &'static str {
    match status {
        SyncStatus::Synced => "synced",
        SyncStatus::Discrepancy => "discrepancy",
        SyncStatus::Error => "error",
        SyncStatus::Unknown => "unknown",
    }
}

fn counts_to_json(counts: &HashMap<String, i64>) -> serde_json::Value {
    serde_json::to_value(counts).unwrap_or_else(|_| serde_json::json!({}))
}

fn json_to_counts(value: serde_json::Value) -> HashMap<String, i64> {
    serde_json::from_value(value).unwrap_or_default()
}

impl SyncStatusRepository for SqlSyncStatusRepository {
    fn insert(&self, executor: &mut dyn QueryExecutor, snapshot: &SyncStatusSnapshot) -> PkdResult<()> {
        executor.execute(
            "INSERT INTO sync_status_snapshots (id, snapshot_time, db_counts, directory_counts, \
             discrepancies, per_country_db_counts, per_country_directory_counts, overall_status, \
             check_duration_ms) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            &[
                SqlValue::from(snapshot.id.to_string().as_str()),
                SqlValue::Timestamp(snapshot.snapshot_time),
                SqlValue::Json(counts_to_json(&snapshot.db_counts)),
                SqlValue::Json(counts_to_json(&snapshot.directory_counts)),
                SqlValue::Json(counts_to_json(&snapshot.discrepancies)),
                SqlValue::Json(snapshot.per_country_db_counts.clone()),
                SqlValue::Json(snapshot.per_country_directory_counts.clone()),
                SqlValue::from(status_str(snapshot.overall_status)),
                SqlValue::Int(snapshot.check_duration_ms as i64),
            ],
        )?;
        Ok(())
    }

    fn most_recent(&self, executor: &mut dyn QueryExecutor) -> PkdResult<Option<SyncStatusSnapshot>> {
        let rows = executor.query(
            "SELECT id, snapshot_time, db_counts, directory_counts, discrepancies, \
             per_country_db_counts, per_country_directory_counts, overall_status, \
             check_duration_ms FROM sync_status_snapshots ORDER BY snapshot_time DESC",
            &[],
        )?;
        let Some(row) = rows.first() else { return Ok(None) };
        let Some(id) = row.text("id").and_then(|s| uuid::Uuid::parse_str(s).ok()) else {
            return Ok(None);
        };
        let Some(snapshot_time) = row.timestamp("snapshot_time") else {
            return Ok(None);
        };
        let overall_status = match row.text("overall_status") {
            Some("synced") => SyncStatus::Synced,
            Some("discrepancy") => SyncStatus::Discrepancy,
            Some("error") => SyncStatus::Error,
            _ => SyncStatus::Unknown,
        };
        Ok(Some(SyncStatusSnapshot {
            id,
            snapshot_time,
            db_counts: row.json("db_counts").map(json_to_counts).unwrap_or_default(),
            directory_counts: row.json("directory_counts").map(json_to_counts).unwrap_or_default(),
            discrepancies: row.json("discrepancies").map(json_to_counts).unwrap_or_default(),
            per_country_db_counts: row.json("per_country_db_counts").unwrap_or_else(|| serde_json::json!({})),
            per_country_directory_counts: row
                .json("per_country_directory_counts")
                .unwrap_or_else(|| serde_json::json!({})),
            overall_status,
            check_duration_ms: row.int("check_duration_ms").unwrap_or(0) as u64,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_round_trip_through_json() {
        let mut counts = HashMap::new();
        counts.insert("csca".to_string(), 5i64);
        let value = counts_to_json(&counts);
        assert_eq!(json_to_counts(value), counts);
    }
}
