//! Validation result persistence (spec §3 `ValidationResult`).

use crate::error::PkdResult;
use crate::models::{ValidationReason, ValidationResult, ValidationStatus};
use crate::query::{QueryExecutor, SqlValue};

pub trait ValidationRepository {
    fn insert(&self, executor: &mut dyn QueryExecutor, result: &ValidationResult) -> PkdResult<()>;
    fn latest_for_certificate(
        &self,
        executor: &mut dyn QueryExecutor,
        certificate_id: uuid::Uuid,
    ) -> PkdResult<Option<ValidationResult>>;
}

pub struct SqlValidationRepository;

fn status_str(status: ValidationStatus) -> &'static str {
    match status {
        ValidationStatus::Valid => "valid",
        ValidationStatus::ExpiredValid => "expired_valid",
        ValidationStatus::Invalid => "invalid",
        ValidationStatus::Pending => "pending",
        ValidationStatus::Error => "error",
    }
}

fn status_from_str(s: &str) -> Option<ValidationStatus> {
    Some(match s {
        "valid" => ValidationStatus::Valid,
        "expired_valid" => ValidationStatus::ExpiredValid,
        "invalid" => ValidationStatus::Invalid,
        "pending" => ValidationStatus::Pending,
        "error" => ValidationStatus::Error,
        _ => return None,
    })
}

impl ValidationRepository for SqlValidationRepository {
    fn insert(&self, executor: &mut dyn QueryExecutor, result: &ValidationResult) -> PkdResult<()> {
        let reasons_csv = result
            .reasons
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join(",");
        executor.execute(
            "INSERT INTO validation_results (id, certificate_id, upload_id, status, \
             trust_chain_valid, signature_valid, validity_period_valid, key_usage_valid, \
             crl_valid, currently_expired, matched_by_fallback, resolved_issuer_fingerprint, \
             crl_id, reasons, evaluated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            &[
                SqlValue::from(result.id.to_string().as_str()),
                SqlValue::from(result.certificate_id.to_string().as_str()),
                result.upload_id.map(|id| SqlValue::Text(id.to_string())).unwrap_or(SqlValue::Null),
                SqlValue::from(status_str(result.status)),
                SqlValue::Bool(result.trust_chain_valid),
                SqlValue::Bool(result.signature_valid),
                SqlValue::Bool(result.validity_period_valid),
                SqlValue::Bool(result.key_usage_valid),
                SqlValue::Bool(result.crl_valid),
                SqlValue::Bool(result.currently_expired),
                SqlValue::Bool(result.matched_by_fallback),
                result.resolved_issuer_fingerprint.clone().map(SqlValue::Text).unwrap_or(SqlValue::Null),
                result.crl_id.map(|id| SqlValue::Text(id.to_string())).unwrap_or(SqlValue::Null),
                SqlValue::from(reasons_csv.as_str()),
                SqlValue::Timestamp(result.evaluated_at),
            ],
        )?;
        Ok(())
    }

    fn latest_for_certificate(
        &self,
        executor: &mut dyn QueryExecutor,
        certificate_id: uuid::Uuid,
    ) -> PkdResult<Option<ValidationResult>> {
        let rows = executor.query(
            "SELECT * FROM validation_results WHERE certificate_id = ? ORDER BY evaluated_at DESC",
            &[SqlValue::from(certificate_id.to_string().as_str())],
        )?;
        let Some(row) = rows.first() else { return Ok(None) };
        let status = row.text("status").and_then(status_from_str);
        let (Some(id), Some(cert_id), Some(status), Some(evaluated_at)) = (
            row.text("id").and_then(|s| uuid::Uuid::parse_str(s).ok()),
            row.text("certificate_id").and_then(|s| uuid::Uuid::parse_str(s).ok()),
            status,
            row.timestamp("evaluated_at"),
        ) else {
            return Ok(None);
        };
        let reasons = row
            .text("reasons")
            .map(|s| {
                s.split(',')
                    .filter(|r| !r.is_empty())
                    .map(|r| ValidationReason::Other(r.to_string()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(Some(ValidationResult {
            id,
            certificate_id: cert_id,
            upload_id: row.text("upload_id").and_then(|s| uuid::Uuid::parse_str(s).ok()),
            status,
            trust_chain_valid: row.bool("trust_chain_valid").unwrap_or(false),
            signature_valid: row.bool("signature_valid").unwrap_or(false),
            validity_period_valid: row.bool("validity_period_valid").unwrap_or(false),
            key_usage_valid: row.bool("key_usage_valid").unwrap_or(false),
            crl_valid: row.bool("crl_valid").unwrap_or(false),
            currently_expired: row.bool("currently_expired").unwrap_or(false),
            matched_by_fallback: row.bool("matched_by_fallback").unwrap_or(false),
            resolved_issuer_fingerprint: row.text("resolved_issuer_fingerprint").map(|s| s.to_string()),
            crl_id: row.text("crl_id").and_then(|s| uuid::Uuid::parse_str(s).ok()),
            reasons,
            evaluated_at,
        }))
    }
}
