use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationStatus {
    Valid,
    ExpiredValid,
    Invalid,
    Pending,
    Error,
}

/// Closed reason taxonomy (spec §7), covering both trust-chain verdicts and
/// the PA-specific verdicts from §4.7/§7 (`DG_HASH_MISMATCH{dg}`,
/// `SOD_SIGNATURE_FAILED`, `DG_MISSING_IN_SOD{dg}`). Kept as one enum rather
/// than a separate `PaReason` type since a `PaVerification` carries both a
/// trust-chain outcome (via [`crate::trust_chain::TrustChainValidator`]) and
/// its own steps in the same `reasons` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationReason {
    NotYetValid,
    Expired,
    CscaNotFound,
    TrustChainSignatureFailed,
    KeyUsageMismatch,
    Revoked,
    CrlExpired,
    CrlUnavailable,
    SelfSignatureFailed,
    SodSignatureFailed,
    DgHashMismatch(u8),
    DgMissingInSod(u8),
    Other(String),
}

impl std::fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationReason::NotYetValid => write!(f, "NOT_YET_VALID"),
            ValidationReason::Expired => write!(f, "EXPIRED"),
            ValidationReason::CscaNotFound => write!(f, "CSCA_NOT_FOUND"),
            ValidationReason::TrustChainSignatureFailed => {
                write!(f, "TRUST_CHAIN_SIGNATURE_FAILED")
            }
            ValidationReason::KeyUsageMismatch => write!(f, "KEY_USAGE_MISMATCH"),
            ValidationReason::Revoked => write!(f, "REVOKED"),
            ValidationReason::CrlExpired => write!(f, "CRL_EXPIRED"),
            ValidationReason::CrlUnavailable => write!(f, "CRL_UNAVAILABLE"),
            ValidationReason::SelfSignatureFailed => write!(f, "SELF_SIGNATURE_FAILED"),
            ValidationReason::SodSignatureFailed => write!(f, "SOD_SIGNATURE_FAILED"),
            ValidationReason::DgHashMismatch(dg) => write!(f, "DG_HASH_MISMATCH{{{dg}}}"),
            ValidationReason::DgMissingInSod(dg) => write!(f, "DG_MISSING_IN_SOD{{{dg}}}"),
            ValidationReason::Other(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub id: uuid::Uuid,
    pub certificate_id: uuid::Uuid,
    pub upload_id: Option<uuid::Uuid>,
    pub status: ValidationStatus,
    pub trust_chain_valid: bool,
    pub signature_valid: bool,
    pub validity_period_valid: bool,
    pub key_usage_valid: bool,
    pub crl_valid: bool,
    pub currently_expired: bool,
    pub matched_by_fallback: bool,
    pub resolved_issuer_fingerprint: Option<String>,
    pub crl_id: Option<uuid::Uuid>,
    pub reasons: Vec<ValidationReason>,
    pub evaluated_at: DateTime<Utc>,
}

impl ValidationResult {
    /// Invariant from spec §8: if all the booleans hold, status must be VALID.
    pub fn status_consistent_with_booleans(&self) -> bool {
        let all_pass = self.trust_chain_valid
            && self.signature_valid
            && self.validity_period_valid
            && self.key_usage_valid
            && self.crl_valid
            && !self.currently_expired;
        if all_pass {
            self.status == ValidationStatus::Valid
        } else {
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ValidationResult {
        ValidationResult {
            id: uuid::Uuid::new_v4(),
            certificate_id: uuid::Uuid::new_v4(),
            upload_id: None,
            status: ValidationStatus::Valid,
            trust_chain_valid: true,
            signature_valid: true,
            validity_period_valid: true,
            key_usage_valid: true,
            crl_valid: true,
            currently_expired: false,
            matched_by_fallback: false,
            resolved_issuer_fingerprint: Some("f".repeat(64)),
            crl_id: None,
            reasons: vec![],
            evaluated_at: Utc::now(),
        }
    }

    #[test]
    fn all_pass_requires_valid_status() {
        let mut r = base();
        assert!(r.status_consistent_with_booleans());
        r.status = ValidationStatus::Invalid;
        assert!(!r.status_consistent_with_booleans());
    }

    #[test]
    fn any_failure_does_not_constrain_status() {
        let mut r = base();
        r.signature_valid = false;
        r.status = ValidationStatus::Invalid;
        assert!(r.status_consistent_with_booleans());
    }

    #[test]
    fn dg_reasons_carry_the_dg_number_in_their_display() {
        assert_eq!(ValidationReason::DgHashMismatch(1).to_string(), "DG_HASH_MISMATCH{1}");
        assert_eq!(ValidationReason::DgMissingInSod(2).to_string(), "DG_MISSING_IN_SOD{2}");
        assert_eq!(ValidationReason::SodSignatureFailed.to_string(), "SOD_SIGNATURE_FAILED");
    }
}
