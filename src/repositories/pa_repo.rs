//! Passive Authentication verification persistence (spec §3 `PaVerification`).

use crate::error::PkdResult;
use crate::models::{PaStatus, PaVerification};
use crate::query::{QueryExecutor, SqlValue};

pub trait PaRepository {
    fn insert(&self, executor: &mut dyn QueryExecutor, verification: &PaVerification) -> PkdResult<()>;
}

pub struct SqlPaRepository;

fn status_str(status: PaStatus) -> &'static str {
    match status {
        PaStatus::Valid => "valid",
        PaStatus::Invalid => "invalid",
        PaStatus::Error => "error",
    }
}

impl PaRepository for SqlPaRepository {
    fn insert(&self, executor: &mut dyn QueryExecutor, verification: &PaVerification) -> PkdResult<()> {
        executor.execute(
            "INSERT INTO pa_verifications (id, issuing_country, document_number, sod_sha256, \
             dsc_fingerprint, csca_fingerprint, trust_chain_valid, sod_signature_valid, \
             dg_hashes_valid, crl_valid, status, processing_duration_ms, client_ip, \
             user_agent, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            &[
                SqlValue::from(verification.id.to_string().as_str()),
                verification.issuing_country.clone().map(SqlValue::Text).unwrap_or(SqlValue::Null),
                verification.document_number.clone().map(SqlValue::Text).unwrap_or(SqlValue::Null),
                SqlValue::from(verification.sod_sha256.as_str()),
                verification.dsc_fingerprint.clone().map(SqlValue::Text).unwrap_or(SqlValue::Null),
                verification.csca_fingerprint.clone().map(SqlValue::Text).unwrap_or(SqlValue::Null),
                SqlValue::Bool(verification.trust_chain_valid),
                SqlValue::Bool(verification.sod_signature_valid),
                SqlValue::Bool(verification.dg_hashes_valid),
                SqlValue::Bool(verification.crl_valid),
                SqlValue::from(status_str(verification.status)),
                SqlValue::Int(verification.processing_duration_ms as i64),
                verification.client_ip.clone().map(SqlValue::Text).unwrap_or(SqlValue::Null),
                verification.user_agent.clone().map(SqlValue::Text).unwrap_or(SqlValue::Null),
                SqlValue::Timestamp(verification.created_at),
            ],
        )?;
        Ok(())
    }
}
