use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconciliationTrigger {
    Manual,
    Scheduled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconciliationStatus {
    InProgress,
    Success,
    Partial,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconciliationAction {
    Add,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconciliationOutcome {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationLogEntry {
    pub fingerprint: String,
    pub kind: crate::models::CertificateKind,
    pub country: String,
    pub action: ReconciliationAction,
    pub outcome: ReconciliationOutcome,
    pub duration_ms: u64,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationRun {
    pub id: uuid::Uuid,
    pub trigger: ReconciliationTrigger,
    pub dry_run: bool,
    pub status: ReconciliationStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub per_kind_added: HashMap<String, u64>,
    pub success_count: u64,
    pub failed_count: u64,
    pub sync_status_snapshot_id: Option<uuid::Uuid>,
    pub log: Vec<ReconciliationLogEntry>,
}

impl ReconciliationRun {
    pub fn new(trigger: ReconciliationTrigger, dry_run: bool) -> Self {
        ReconciliationRun {
            id: uuid::Uuid::new_v4(),
            trigger,
            dry_run,
            status: ReconciliationStatus::InProgress,
            started_at: Utc::now(),
            completed_at: None,
            per_kind_added: HashMap::new(),
            success_count: 0,
            failed_count: 0,
            sync_status_snapshot_id: None,
            log: Vec::new(),
        }
    }

    /// Invariant from spec §8: success + failed == total attempted.
    pub fn counts_are_consistent(&self, total_added_attempted: u64) -> bool {
        if self.status == ReconciliationStatus::InProgress {
            return true;
        }
        self.success_count + self.failed_count == total_added_attempted
    }

    pub fn record(&mut self, entry: ReconciliationLogEntry) {
        match entry.outcome {
            ReconciliationOutcome::Success => {
                self.success_count += 1;
                *self
                    .per_kind_added
                    .entry(entry.kind.to_string())
                    .or_insert(0) += 1;
            }
            ReconciliationOutcome::Failed => self.failed_count += 1,
        }
        self.log.push(entry);
    }

    pub fn finish(&mut self) {
        self.completed_at = Some(Utc::now());
        self.status = if self.failed_count == 0 {
            ReconciliationStatus::Success
        } else if self.success_count > 0 {
            ReconciliationStatus::Partial
        } else {
            ReconciliationStatus::Failed
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CertificateKind;

    #[test]
    fn finishing_with_no_failures_is_success() {
        let mut run = ReconciliationRun::new(ReconciliationTrigger::Manual, false);
        run.record(ReconciliationLogEntry {
            fingerprint: "f".repeat(64),
            kind: CertificateKind::Csca,
            country: "KR".into(),
            action: ReconciliationAction::Add,
            outcome: ReconciliationOutcome::Success,
            duration_ms: 5,
            error_message: None,
        });
        run.finish();
        assert_eq!(run.status, ReconciliationStatus::Success);
        assert!(run.counts_are_consistent(1));
    }

    #[test]
    fn finishing_with_mixed_outcomes_is_partial() {
        let mut run = ReconciliationRun::new(ReconciliationTrigger::Scheduled, false);
        run.record(ReconciliationLogEntry {
            fingerprint: "a".repeat(64),
            kind: CertificateKind::Dsc,
            country: "KR".into(),
            action: ReconciliationAction::Add,
            outcome: ReconciliationOutcome::Success,
            duration_ms: 1,
            error_message: None,
        });
        run.record(ReconciliationLogEntry {
            fingerprint: "b".repeat(64),
            kind: CertificateKind::Dsc,
            country: "KR".into(),
            action: ReconciliationAction::Add,
            outcome: ReconciliationOutcome::Failed,
            duration_ms: 1,
            error_message: Some("timeout".into()),
        });
        run.finish();
        assert_eq!(run.status, ReconciliationStatus::Partial);
        assert!(run.counts_are_consistent(2));
    }
}
