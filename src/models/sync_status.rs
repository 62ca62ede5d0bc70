use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    Synced,
    Discrepancy,
    Error,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStatusSnapshot {
    pub id: uuid::Uuid,
    pub snapshot_time: DateTime<Utc>,
    pub db_counts: HashMap<String, i64>,
    pub directory_counts: HashMap<String, i64>,
    /// Signed: `db_counts[kind] - directory_counts[kind]`.
    pub discrepancies: HashMap<String, i64>,
    /// Per-country breakdown (spec §3), stored as a JSON-column field
    /// (spec §6): country -> {kind -> count}. Kept as `serde_json::Value`
    /// rather than a nested `HashMap` because that's exactly the shape a
    /// JSON-typed column round-trips as, on either dialect.
    pub per_country_db_counts: serde_json::Value,
    pub per_country_directory_counts: serde_json::Value,
    pub overall_status: SyncStatus,
    pub check_duration_ms: u64,
}

impl SyncStatusSnapshot {
    pub fn compute(
        db_counts: HashMap<String, i64>,
        directory_counts: HashMap<String, i64>,
        check_duration_ms: u64,
    ) -> Self {
        Self::compute_with_countries(db_counts, directory_counts, json!({}), json!({}), check_duration_ms)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn compute_with_countries(
        db_counts: HashMap<String, i64>,
        directory_counts: HashMap<String, i64>,
        per_country_db_counts: serde_json::Value,
        per_country_directory_counts: serde_json::Value,
        check_duration_ms: u64,
    ) -> Self {
        let mut discrepancies = HashMap::new();
        for (kind, db_count) in &db_counts {
            let dir_count = directory_counts.get(kind).copied().unwrap_or(0);
            discrepancies.insert(kind.clone(), db_count - dir_count);
        }
        let overall_status = if discrepancies.values().all(|d| *d == 0) {
            SyncStatus::Synced
        } else {
            SyncStatus::Discrepancy
        };
        SyncStatusSnapshot {
            id: uuid::Uuid::new_v4(),
            snapshot_time: Utc::now(),
            db_counts,
            directory_counts,
            discrepancies,
            per_country_db_counts,
            per_country_directory_counts,
            overall_status,
            check_duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_counts_are_synced() {
        let mut db = HashMap::new();
        db.insert("csca".to_string(), 5);
        let mut dir = HashMap::new();
        dir.insert("csca".to_string(), 5);
        let snap = SyncStatusSnapshot::compute(db, dir, 10);
        assert_eq!(snap.overall_status, SyncStatus::Synced);
        assert_eq!(snap.discrepancies["csca"], 0);
    }

    #[test]
    fn mismatched_counts_are_discrepancy() {
        let mut db = HashMap::new();
        db.insert("csca".to_string(), 5);
        let dir = HashMap::new();
        let snap = SyncStatusSnapshot::compute(db, dir, 10);
        assert_eq!(snap.overall_status, SyncStatus::Discrepancy);
        assert_eq!(snap.discrepancies["csca"], 5);
    }

    #[test]
    fn compute_without_country_breakdown_defaults_to_empty_objects() {
        let snap = SyncStatusSnapshot::compute(HashMap::new(), HashMap::new(), 0);
        assert_eq!(snap.per_country_db_counts, json!({}));
        assert_eq!(snap.per_country_directory_counts, json!({}));
    }

    #[test]
    fn compute_with_countries_carries_the_per_country_breakdown() {
        let per_country = json!({"KR": {"csca": 1}, "US": {"csca": 2}});
        let snap = SyncStatusSnapshot::compute_with_countries(
            HashMap::new(),
            HashMap::new(),
            per_country.clone(),
            json!({}),
            0,
        );
        assert_eq!(snap.per_country_db_counts, per_country);
    }
}
