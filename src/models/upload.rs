use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadFormat {
    Ldif,
    Ml,
    Pem,
    Der,
    P7b,
    Dl,
    Crl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadMode {
    Auto,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadState {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Upload {
    pub id: uuid::Uuid,
    pub original_filename: String,
    pub size_bytes: u64,
    pub sha256: String,
    pub format: UploadFormat,
    pub mode: UploadMode,
    pub state: UploadState,
    pub total_entries: u64,
    pub processed_entries: u64,
    pub per_kind_counts: HashMap<String, u64>,
    pub per_kind_duplicates: HashMap<String, u64>,
    pub validation_outcomes: HashMap<String, u64>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

impl Upload {
    pub fn new(original_filename: String, size_bytes: u64, sha256: String, format: UploadFormat, mode: UploadMode) -> Self {
        Upload {
            id: uuid::Uuid::new_v4(),
            original_filename,
            size_bytes,
            sha256,
            format,
            mode,
            state: UploadState::Pending,
            total_entries: 0,
            processed_entries: 0,
            per_kind_counts: HashMap::new(),
            per_kind_duplicates: HashMap::new(),
            validation_outcomes: HashMap::new(),
            created_at: Utc::now(),
            completed_at: None,
            failure_reason: None,
        }
    }

    /// Invariant from spec §8: once COMPLETED, total == processed.
    pub fn is_consistent_when_completed(&self) -> bool {
        self.state != UploadState::Completed || self.total_entries == self.processed_entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_upload_starts_pending() {
        let u = Upload::new("bundle.ldif".into(), 1024, "a".repeat(64), UploadFormat::Ldif, UploadMode::Auto);
        assert_eq!(u.state, UploadState::Pending);
        assert_eq!(u.total_entries, 0);
    }

    #[test]
    fn consistency_invariant_only_binds_when_completed() {
        let mut u = Upload::new("bundle.ldif".into(), 1024, "a".repeat(64), UploadFormat::Ldif, UploadMode::Auto);
        u.total_entries = 10;
        u.processed_entries = 3;
        assert!(u.is_consistent_when_completed()); // still PENDING, vacuously fine
        u.state = UploadState::Completed;
        assert!(!u.is_consistent_when_completed());
        u.processed_entries = 10;
        assert!(u.is_consistent_when_completed());
    }
}
