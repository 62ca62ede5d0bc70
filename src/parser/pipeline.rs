//! Upload state machine and per-item ingestion (spec §4.3). Drives an
//! `Upload` through `PENDING -> PROCESSING -> {COMPLETED, FAILED}`,
//! dispatching each classified item to the certificate/CRL/Master List
//! repositories and publishing progress every 500 entries.

use std::collections::HashMap;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Mutex;

use chrono::Utc;

use crate::error::PkdResult;
use crate::models::{
    Certificate, CertificateKind, Crl, MasterList, Upload, UploadFormat, UploadMode, UploadState,
};
use crate::pki;
use crate::query::QueryExecutor;
use crate::repositories::{certificate_repo::observed_now, CertificateRepository, CrlRepository, MasterListRepository, UploadRepository};

const PROGRESS_BATCH: u64 = 500;

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Progress { upload_id: uuid::Uuid, processed: u64, total: u64 },
    Completed { upload_id: uuid::Uuid },
    Failed { upload_id: uuid::Uuid, reason: String },
}

/// Stands in for the out-of-scope HTTP layer's SSE stream (SPEC_FULL.md
/// External interfaces): one broadcast channel per in-flight upload id.
#[derive(Default)]
pub struct ProgressHub {
    subscribers: Mutex<HashMap<uuid::Uuid, Vec<Sender<ProgressEvent>>>>,
}

impl ProgressHub {
    pub fn subscribe(&self, upload_id: uuid::Uuid) -> Receiver<ProgressEvent> {
        let (tx, rx) = std::sync::mpsc::channel();
        self.subscribers.lock().unwrap().entry(upload_id).or_default().push(tx);
        rx
    }

    fn publish(&self, upload_id: uuid::Uuid, event: ProgressEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        if let Some(senders) = subscribers.get_mut(&upload_id) {
            senders.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }
}

pub struct ProcessContext<'a> {
    pub certificate_repo: &'a dyn CertificateRepository,
    pub crl_repo: &'a dyn CrlRepository,
    pub masterlist_repo: &'a dyn MasterListRepository,
    pub upload_repo: &'a dyn UploadRepository,
    pub progress: &'a ProgressHub,
}

pub fn process_upload(
    ctx: &ProcessContext,
    executor: &mut dyn QueryExecutor,
    mut upload: Upload,
    bytes: &[u8],
) -> PkdResult<Upload> {
    upload.state = UploadState::Processing;
    ctx.upload_repo.update_progress(executor, &upload)?;

    let outcome = match upload.format {
        UploadFormat::Ldif => ingest_ldif(ctx, executor, &mut upload, bytes),
        UploadFormat::Ml => ingest_masterlist(ctx, executor, &mut upload, bytes),
        UploadFormat::Pem | UploadFormat::Der | UploadFormat::P7b => {
            ingest_certificate_container(ctx, executor, &mut upload, bytes)
        }
        UploadFormat::Crl => ingest_crl(ctx, executor, &mut upload, bytes),
        UploadFormat::Dl => ingest_deviation_list(ctx, executor, &mut upload, bytes),
    };

    match outcome {
        Ok(()) => {
            upload.state = UploadState::Completed;
            upload.completed_at = Some(Utc::now());
            ctx.upload_repo.update_progress(executor, &upload)?;
            ctx.progress.publish(upload.id, ProgressEvent::Completed { upload_id: upload.id });
        }
        Err(e) => {
            // Partial parses leave already-persisted items in place
            // (spec §4.3 deliberate behavior); only the upload record
            // itself transitions to FAILED.
            upload.state = UploadState::Failed;
            upload.failure_reason = Some(e.to_string());
            ctx.upload_repo.update_progress(executor, &upload)?;
            ctx.progress.publish(upload.id, ProgressEvent::Failed { upload_id: upload.id, reason: e.to_string() });
        }
    }
    Ok(upload)
}

fn bump_progress(ctx: &ProcessContext, executor: &mut dyn QueryExecutor, upload: &mut Upload) -> PkdResult<()> {
    upload.processed_entries += 1;
    if upload.processed_entries % PROGRESS_BATCH == 0 {
        ctx.upload_repo.update_progress(executor, upload)?;
        ctx.progress.publish(
            upload.id,
            ProgressEvent::Progress { upload_id: upload.id, processed: upload.processed_entries, total: upload.total_entries },
        );
    }
    Ok(())
}

fn ingest_certificate(
    ctx: &ProcessContext,
    executor: &mut dyn QueryExecutor,
    upload: &mut Upload,
    kind: CertificateKind,
    country_hint: Option<String>,
    der: &[u8],
) -> PkdResult<()> {
    let parsed = pki::x509::parse_x509(der)?;
    let fingerprint = pki::digest::sha256_hex(der);

    if let Some(existing) = ctx.certificate_repo.find_by_fingerprint(executor, kind, &fingerprint)? {
        let observation = observed_now(upload.id, "ingest");
        ctx.certificate_repo.record_duplicate(executor, existing.id, &observation)?;
        *upload.per_kind_duplicates.entry(kind.to_string()).or_insert(0) += 1;
    } else {
        let country = country_hint.unwrap_or_else(|| {
            crate::pki::country::normalise_country(&crate::pki::country::extract_country_from_dn(&parsed.subject_dn))
        });
        let certificate = Certificate {
            id: uuid::Uuid::new_v4(),
            kind,
            country,
            subject_dn: parsed.subject_dn.clone(),
            issuer_dn: parsed.issuer_dn.clone(),
            serial_hex: parsed.serial_hex.clone(),
            fingerprint: fingerprint.clone(),
            not_before: parsed.not_before,
            not_after: parsed.not_after,
            public_key_algorithm: parsed.public_key_algorithm.clone(),
            public_key_size_bits: parsed.public_key_size_bits,
            signature_algorithm: parsed.signature_algorithm_oid.clone(),
            der: der.to_vec(),
            directory_stored: false,
            duplicate_count: 0,
            last_seen_upload_id: Some(upload.id),
            duplicates: vec![],
            link_extra: None,
        };
        ctx.certificate_repo.insert(executor, &certificate)?;
        *upload.per_kind_counts.entry(kind.to_string()).or_insert(0) += 1;
    }

    upload.total_entries += 1;
    bump_progress(ctx, executor, upload)
}

fn ingest_ldif(ctx: &ProcessContext, executor: &mut dyn QueryExecutor, upload: &mut Upload, bytes: &[u8]) -> PkdResult<()> {
    use crate::parser::ldif::{classify, parse_entry, split_entries, LdifItemKind};

    let text = String::from_utf8_lossy(bytes).to_string();
    for block in split_entries(&text) {
        let entry = parse_entry(&block)?;
        let Some(kind) = classify(&entry) else { continue };
        let country = crate::pki::country::extract_country_from_dn(&entry.dn);
        let country = (!country.is_empty()).then_some(crate::pki::country::normalise_country(&country));

        match kind {
            LdifItemKind::Certificate(cert_kind) => {
                if let Some(values) = entry.attributes.get("userCertificate;binary") {
                    for der in values {
                        ingest_certificate(ctx, executor, upload, cert_kind, country.clone(), der)?;
                    }
                }
            }
            LdifItemKind::Crl => {
                if let Some(values) = entry.attributes.get("certificateRevocationList;binary") {
                    for der in values {
                        ingest_crl_bytes(ctx, executor, upload, der)?;
                    }
                }
            }
            LdifItemKind::MasterList => {
                if let Some(values) = entry.attributes.get("CscaMasterListData") {
                    for cms in values {
                        ingest_masterlist_bytes(ctx, executor, upload, cms)?;
                    }
                }
            }
        }
    }
    Ok(())
}

fn ingest_masterlist(ctx: &ProcessContext, executor: &mut dyn QueryExecutor, upload: &mut Upload, bytes: &[u8]) -> PkdResult<()> {
    ingest_masterlist_bytes(ctx, executor, upload, bytes)
}

fn ingest_masterlist_bytes(ctx: &ProcessContext, executor: &mut dyn QueryExecutor, upload: &mut Upload, bytes: &[u8]) -> PkdResult<()> {
    let cms = pki::cms::parse_cms_signed_data(bytes)?;
    let fingerprint = pki::digest::sha256_hex(bytes);

    if ctx.masterlist_repo.find_by_fingerprint(executor, &fingerprint)?.is_some() {
        *upload.per_kind_duplicates.entry("ml".to_string()).or_insert(0) += 1;
        upload.total_entries += 1;
        return bump_progress(ctx, executor, upload);
    }

    // The outer signer certificate is the MLSC; every inner certificate in
    // the SEQUENCE OF Certificate is a CSCA (spec §4.3).
    let mlsc_fingerprint = cms
        .certificates_der
        .first()
        .map(|der| pki::digest::sha256_hex(der))
        .unwrap_or_default();
    if let Some(mlsc_der) = cms.certificates_der.first() {
        ingest_certificate(ctx, executor, upload, CertificateKind::Mlsc, None, mlsc_der)?;
    }

    let inner_certificates: Vec<Vec<u8>> =
        rasn::der::decode::<rasn::types::SequenceOf<rasn::types::Any>>(&cms.encapsulated_content)
            .map(|seq| seq.into_iter().map(|any| any.contents).collect())
            .unwrap_or_default();
    for der in &inner_certificates {
        ingest_certificate(ctx, executor, upload, CertificateKind::Csca, None, der)?;
    }

    let masterlist = MasterList {
        id: uuid::Uuid::new_v4(),
        signer_country: cms
            .certificates_der
            .first()
            .and_then(|der| pki::x509::parse_x509(der).ok())
            .map(|p| crate::pki::country::normalise_country(&crate::pki::country::extract_country_from_dn(&p.subject_dn)))
            .unwrap_or_default(),
        version: None,
        signing_time: cms.signing_time,
        fingerprint,
        mlsc_fingerprint,
        certificate_count: inner_certificates.len() as u32,
        cms_bytes: bytes.to_vec(),
        directory_stored: false,
    };
    ctx.masterlist_repo.insert(executor, &masterlist)?;
    *upload.per_kind_counts.entry("ml".to_string()).or_insert(0) += 1;
    upload.total_entries += 1;
    bump_progress(ctx, executor, upload)
}

fn ingest_certificate_container(ctx: &ProcessContext, executor: &mut dyn QueryExecutor, upload: &mut Upload, bytes: &[u8]) -> PkdResult<()> {
    let der = match upload.format {
        UploadFormat::Pem => pem_to_der(bytes)?,
        _ => bytes.to_vec(),
    };
    // P7B extraction falls back to treating the content as a single
    // SignedData wrapper whose embedded certificates are all CSCAs, the
    // common shape for a Master List bridge bundle.
    if upload.format == UploadFormat::P7b {
        if let Ok(cms) = pki::cms::parse_cms_signed_data(&der) {
            for cert_der in &cms.certificates_der {
                ingest_certificate(ctx, executor, upload, CertificateKind::Csca, None, cert_der)?;
            }
            return Ok(());
        }
    }
    ingest_certificate(ctx, executor, upload, CertificateKind::Dsc, None, &der)
}

fn pem_to_der(bytes: &[u8]) -> PkdResult<Vec<u8>> {
    use base64::Engine;
    let text = String::from_utf8_lossy(bytes);
    let body: String = text
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .collect::<Vec<_>>()
        .join("");
    base64::engine::general_purpose::STANDARD
        .decode(body.trim())
        .map_err(|e| crate::error::PkdError::InvalidBase64(e.to_string()))
}

fn ingest_crl(ctx: &ProcessContext, executor: &mut dyn QueryExecutor, upload: &mut Upload, bytes: &[u8]) -> PkdResult<()> {
    ingest_crl_bytes(ctx, executor, upload, bytes)
}

fn ingest_crl_bytes(ctx: &ProcessContext, executor: &mut dyn QueryExecutor, upload: &mut Upload, der: &[u8]) -> PkdResult<()> {
    let crl = crate::pki::crl::parse_crl(der)?;
    ctx.crl_repo.upsert(executor, &crl)?;
    *upload.per_kind_counts.entry("crl".to_string()).or_insert(0) += 1;
    upload.total_entries += 1;
    bump_progress(ctx, executor, upload)
}

fn ingest_deviation_list(ctx: &ProcessContext, executor: &mut dyn QueryExecutor, upload: &mut Upload, bytes: &[u8]) -> PkdResult<()> {
    let cms = pki::cms::parse_cms_signed_data(bytes)?;
    let record = crate::models::DeviationListRecord {
        id: uuid::Uuid::new_v4(),
        signer_country: cms
            .certificates_der
            .first()
            .and_then(|der| pki::x509::parse_x509(der).ok())
            .map(|p| crate::pki::country::normalise_country(&crate::pki::country::extract_country_from_dn(&p.subject_dn)))
            .unwrap_or_default(),
        signing_time: cms.signing_time,
        fingerprint: pki::digest::sha256_hex(bytes),
        entry_count: 0,
    };
    ctx.masterlist_repo.insert_deviation_list(executor, &record)?;
    upload.total_entries += 1;
    bump_progress(ctx, executor, upload)
}

/// Used only by tests/CLI callers that don't already know the upload
/// mode; production callers always pass mode explicitly per spec §3.
pub fn default_mode() -> UploadMode {
    UploadMode::Auto
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mode_is_auto() {
        assert_eq!(default_mode(), UploadMode::Auto);
    }
}
