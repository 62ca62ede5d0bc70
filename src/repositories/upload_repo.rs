//! Upload lifecycle persistence (spec §3 `Upload`, §8 completion invariant).

use std::collections::HashMap;

use crate::error::PkdResult;
use crate::models::{Upload, UploadFormat, UploadMode, UploadState};
use crate::query::{QueryExecutor, QueryRow, SqlValue};

pub trait UploadRepository {
    fn insert(&self, executor: &mut dyn QueryExecutor, upload: &Upload) -> PkdResult<()>;
    fn find_by_sha256(&self, executor: &mut dyn QueryExecutor, sha256: &str) -> PkdResult<Option<Upload>>;
    fn find_by_id(&self, executor: &mut dyn QueryExecutor, id: uuid::Uuid) -> PkdResult<Option<Upload>>;
    fn update_progress(&self, executor: &mut dyn QueryExecutor, upload: &Upload) -> PkdResult<()>;
}

pub struct SqlUploadRepository;

fn counts_from_csv(raw: Option<&str>) -> HashMap<String, u64> {
    raw.map(|s| {
        s.split(';')
            .filter(|pair| !pair.is_empty())
            .filter_map(|pair| {
                let (key, value) = pair.split_once('=')?;
                Some((key.to_string(), value.parse().ok()?))
            })
            .collect()
    })
    .unwrap_or_default()
}

fn counts_to_csv(counts: &HashMap<String, u64>) -> String {
    counts
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(";")
}

fn row_to_upload(row: &QueryRow) -> Option<Upload> {
    Some(Upload {
        id: uuid::Uuid::parse_str(row.text("id")?).ok()?,
        original_filename: row.text("original_filename")?.to_string(),
        size_bytes: row.int("size_bytes")? as u64,
        sha256: row.text("sha256")?.to_string(),
        format: match row.text("format")? {
            "ldif" => UploadFormat::Ldif,
            "ml" => UploadFormat::Ml,
            "pem" => UploadFormat::Pem,
            "der" => UploadFormat::Der,
            "p7b" => UploadFormat::P7b,
            "dl" => UploadFormat::Dl,
            "crl" => UploadFormat::Crl,
            _ => return None,
        },
        mode: match row.text("mode")? {
            "auto" => UploadMode::Auto,
            _ => UploadMode::Manual,
        },
        state: match row.text("state")? {
            "pending" => UploadState::Pending,
            "processing" => UploadState::Processing,
            "completed" => UploadState::Completed,
            _ => UploadState::Failed,
        },
        total_entries: row.int("total_entries")? as u64,
        processed_entries: row.int("processed_entries")? as u64,
        per_kind_counts: counts_from_csv(row.text("per_kind_counts")),
        per_kind_duplicates: counts_from_csv(row.text("per_kind_duplicates")),
        validation_outcomes: counts_from_csv(row.text("validation_outcomes")),
        created_at: row.timestamp("created_at")?,
        completed_at: row.timestamp("completed_at"),
        failure_reason: row.text("failure_reason").map(|s| s.to_string()),
    })
}

fn format_str(format: UploadFormat) -> &'static str {
    match format {
        UploadFormat::Ldif => "ldif",
        UploadFormat::Ml => "ml",
        UploadFormat::Pem => "pem",
        UploadFormat::Der => "der",
        UploadFormat::P7b => "p7b",
        UploadFormat::Dl => "dl",
        UploadFormat::Crl => "crl",
    }
}

fn mode_str(mode: UploadMode) -> &'static str {
    match mode {
        UploadMode::Auto => "auto",
        UploadMode::Manual => "manual",
    }
}

fn state_str(state: UploadState) -> &'static str {
    match state {
        UploadState::Pending => "pending",
        UploadState::Processing => "processing",
        UploadState::Completed => "completed",
        UploadState::Failed => "failed",
    }
}

impl UploadRepository for SqlUploadRepository {
    fn insert(&self, executor: &mut dyn QueryExecutor, upload: &Upload) -> PkdResult<()> {
        executor.execute(
            "INSERT INTO uploads (id, original_filename, size_bytes, sha256, format, mode, \
             state, total_entries, processed_entries, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            &[
                SqlValue::from(upload.id.to_string().as_str()),
                SqlValue::from(upload.original_filename.as_str()),
                SqlValue::Int(upload.size_bytes as i64),
                SqlValue::from(upload.sha256.as_str()),
                SqlValue::from(format_str(upload.format)),
                SqlValue::from(mode_str(upload.mode)),
                SqlValue::from(state_str(upload.state)),
                SqlValue::Int(upload.total_entries as i64),
                SqlValue::Int(upload.processed_entries as i64),
                SqlValue::Timestamp(upload.created_at),
            ],
        )?;
        Ok(())
    }

    fn find_by_sha256(&self, executor: &mut dyn QueryExecutor, sha256: &str) -> PkdResult<Option<Upload>> {
        let rows = executor.query("SELECT * FROM uploads WHERE sha256 = ?", &[SqlValue::from(sha256)])?;
        Ok(rows.first().and_then(row_to_upload))
    }

    fn find_by_id(&self, executor: &mut dyn QueryExecutor, id: uuid::Uuid) -> PkdResult<Option<Upload>> {
        let rows = executor.query(
            "SELECT * FROM uploads WHERE id = ?",
            &[SqlValue::from(id.to_string().as_str())],
        )?;
        Ok(rows.first().and_then(row_to_upload))
    }

    fn update_progress(&self, executor: &mut dyn QueryExecutor, upload: &Upload) -> PkdResult<()> {
        executor.execute(
            "UPDATE uploads SET state = ?, total_entries = ?, processed_entries = ?, \
             per_kind_counts = ?, per_kind_duplicates = ?, validation_outcomes = ?, \
             completed_at = ?, failure_reason = ? WHERE id = ?",
            &[
                SqlValue::from(state_str(upload.state)),
                SqlValue::Int(upload.total_entries as i64),
                SqlValue::Int(upload.processed_entries as i64),
                SqlValue::from(counts_to_csv(&upload.per_kind_counts).as_str()),
                SqlValue::from(counts_to_csv(&upload.per_kind_duplicates).as_str()),
                SqlValue::from(counts_to_csv(&upload.validation_outcomes).as_str()),
                upload.completed_at.map(SqlValue::Timestamp).unwrap_or(SqlValue::Null),
                upload.failure_reason.clone().map(SqlValue::Text).unwrap_or(SqlValue::Null),
                SqlValue::from(upload.id.to_string().as_str()),
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_round_trip_through_csv_encoding() {
        let mut counts = HashMap::new();
        counts.insert("csca".to_string(), 3u64);
        counts.insert("dsc".to_string(), 10u64);
        let encoded = counts_to_csv(&counts);
        let decoded = counts_from_csv(Some(&encoded));
        assert_eq!(decoded, counts);
    }
}
