use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaStatus {
    Valid,
    Invalid,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataGroupCheck {
    pub dg_number: u8,
    pub expected_hash: Option<String>,
    pub computed_hash: Option<String>,
    pub algorithm: String,
    pub matched: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaVerification {
    pub id: uuid::Uuid,
    pub issuing_country: Option<String>,
    pub document_number: Option<String>,
    pub sod_sha256: String,
    pub dsc_fingerprint: Option<String>,
    pub csca_fingerprint: Option<String>,
    pub trust_chain_valid: bool,
    pub sod_signature_valid: bool,
    pub dg_hashes_valid: bool,
    pub crl_valid: bool,
    pub status: PaStatus,
    pub reasons: Vec<crate::models::ValidationReason>,
    pub datagroup_checks: Vec<DataGroupCheck>,
    pub processing_duration_ms: u64,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PaVerification {
    /// Invariant from spec §8: `sum(matched) == len(checks)` iff `dg_hashes_valid`.
    pub fn dg_hashes_valid_consistent(&self) -> bool {
        let all_matched = self.datagroup_checks.iter().all(|c| c.matched);
        all_matched == self.dg_hashes_valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(matched: bool) -> DataGroupCheck {
        DataGroupCheck {
            dg_number: 1,
            expected_hash: Some("a".repeat(64)),
            computed_hash: Some("a".repeat(64)),
            algorithm: "SHA-256".to_string(),
            matched,
        }
    }

    fn base(checks: Vec<DataGroupCheck>, dg_hashes_valid: bool) -> PaVerification {
        PaVerification {
            id: uuid::Uuid::new_v4(),
            issuing_country: Some("KR".to_string()),
            document_number: None,
            sod_sha256: "s".repeat(64),
            dsc_fingerprint: None,
            csca_fingerprint: None,
            trust_chain_valid: true,
            sod_signature_valid: true,
            dg_hashes_valid,
            crl_valid: true,
            status: PaStatus::Valid,
            reasons: vec![],
            datagroup_checks: checks,
            processing_duration_ms: 5,
            client_ip: None,
            user_agent: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn all_matched_implies_valid_flag() {
        let pv = base(vec![check(true), check(true)], true);
        assert!(pv.dg_hashes_valid_consistent());
    }

    #[test]
    fn one_mismatch_contradicts_valid_flag() {
        let pv = base(vec![check(true), check(false)], true);
        assert!(!pv.dg_hashes_valid_consistent());
    }
}
