//! Reconciliation run persistence (spec §3 `ReconciliationRun`, §4.6).

use crate::error::PkdResult;
use crate::models::{ReconciliationRun, ReconciliationStatus, ReconciliationTrigger};
use crate::query::{QueryExecutor, SqlValue};

pub trait ReconciliationRepository {
    fn insert(&self, executor: &mut dyn QueryExecutor, run: &ReconciliationRun) -> PkdResult<()>;
    fn update(&self, executor: &mut dyn QueryExecutor, run: &ReconciliationRun) -> PkdResult<()>;
    fn most_recent(&self, executor: &mut dyn QueryExecutor) -> PkdResult<Option<ReconciliationRun>>;
}

pub struct SqlReconciliationRepository;

fn trigger_str(trigger: ReconciliationTrigger) -> &'static str {
    match trigger {
        ReconciliationTrigger::Manual => "manual",
        ReconciliationTrigger::Scheduled => "scheduled",
    }
}

fn status_str(status: ReconciliationStatus) -> &'static str {
    match status {
        ReconciliationStatus::InProgress => "in_progress",
        ReconciliationStatus::Success => "success",
        ReconciliationStatus::Partial => "partial",
        ReconciliationStatus::Failed => "failed",
    }
}

impl ReconciliationRepository for SqlReconciliationRepository {
    fn insert(&self, executor: &mut dyn QueryExecutor, run: &ReconciliationRun) -> PkdResult<()> {
        executor.execute(
            "INSERT INTO reconciliation_runs (id, trigger, dry_run, status, started_at) \
             VALUES (?, ?, ?, ?, ?)",
            &[
                SqlValue::from(run.id.to_string().as_str()),
                SqlValue::from(trigger_str(run.trigger)),
                SqlValue::Bool(run.dry_run),
                SqlValue::from(status_str(run.status)),
                SqlValue::Timestamp(run.started_at),
            ],
        )?;
        Ok(())
    }

    fn update(&self, executor: &mut dyn QueryExecutor, run: &ReconciliationRun) -> PkdResult<()> {
        executor.execute(
            "UPDATE reconciliation_runs SET status = ?, completed_at = ?, success_count = ?, \
             failed_count = ? WHERE id = ?",
            &[
                SqlValue::from(status_str(run.status)),
                run.completed_at.map(SqlValue::Timestamp).unwrap_or(SqlValue::Null),
                SqlValue::Int(run.success_count as i64),
                SqlValue::Int(run.failed_count as i64),
                SqlValue::from(run.id.to_string().as_str()),
            ],
        )?;
        Ok(())
    }

    fn most_recent(&self, executor: &mut dyn QueryExecutor) -> PkdResult<Option<ReconciliationRun>> {
        // Full log replay is intentionally not reconstructed from storage;
        // callers needing run history read `reconciliation_log` directly.
        let rows = executor.query(
            "SELECT id, trigger, dry_run, status, started_at FROM reconciliation_runs \
             ORDER BY started_at DESC",
            &[],
        )?;
        let Some(row) = rows.first() else { return Ok(None) };
        let id = row.text("id").and_then(|s| uuid::Uuid::parse_str(s).ok());
        let trigger = match row.text("trigger") {
            Some("scheduled") => Some(ReconciliationTrigger::Scheduled),
            Some("manual") => Some(ReconciliationTrigger::Manual),
            _ => None,
        };
        let (Some(id), Some(trigger), Some(started_at)) = (id, trigger, row.timestamp("started_at")) else {
            return Ok(None);
        };
        Ok(Some(ReconciliationRun {
            id,
            trigger,
            dry_run: row.bool("dry_run").unwrap_or(false),
            status: ReconciliationStatus::InProgress,
            started_at,
            completed_at: None,
            per_kind_added: Default::default(),
            success_count: 0,
            failed_count: 0,
            sync_status_snapshot_id: None,
            log: Vec::new(),
        }))
    }
}
