//! Certificate persistence (spec §3 `Certificate`, §3 "ledger of duplicate
//! observations", §8 `(kind, fingerprint)` uniqueness).

use chrono::Utc;

use crate::error::PkdResult;
use crate::models::{Certificate, CertificateKind, DuplicateObservation};
use crate::query::{QueryExecutor, SqlValue};

/// Operations the rest of the pipeline needs against certificate storage.
/// Implemented once against a live [`QueryExecutor`] and once in memory for
/// tests (see [`crate::repositories::in_memory`]).
pub trait CertificateRepository {
    fn find_by_fingerprint(
        &self,
        executor: &mut dyn QueryExecutor,
        kind: CertificateKind,
        fingerprint: &str,
    ) -> PkdResult<Option<Certificate>>;

    fn insert(&self, executor: &mut dyn QueryExecutor, certificate: &Certificate) -> PkdResult<()>;

    fn record_duplicate(
        &self,
        executor: &mut dyn QueryExecutor,
        certificate_id: uuid::Uuid,
        observation: &DuplicateObservation,
    ) -> PkdResult<()>;

    /// Candidates for issuer resolution: same kind, same country, matching
    /// subject DN (spec §4.4 step 4's CN-match and fallback search).
    fn find_by_subject(
        &self,
        executor: &mut dyn QueryExecutor,
        kind: CertificateKind,
        subject_dn: &str,
    ) -> PkdResult<Vec<Certificate>>;

    fn find_csca_by_country(
        &self,
        executor: &mut dyn QueryExecutor,
        country: &str,
    ) -> PkdResult<Vec<Certificate>>;

    fn list_by_kind(
        &self,
        executor: &mut dyn QueryExecutor,
        kind: CertificateKind,
    ) -> PkdResult<Vec<Certificate>>;

    /// Certificates of syncable kinds not yet marked `directory_stored`
    /// (spec §4.6 step 1's divergence scan).
    fn list_not_directory_stored(
        &self,
        executor: &mut dyn QueryExecutor,
    ) -> PkdResult<Vec<Certificate>>;

    fn mark_directory_stored(
        &self,
        executor: &mut dyn QueryExecutor,
        certificate_id: uuid::Uuid,
    ) -> PkdResult<()>;

    fn count_by_kind(&self, executor: &mut dyn QueryExecutor) -> PkdResult<std::collections::HashMap<String, i64>>;

    /// Per-country, per-kind counts (spec §3 `SyncStatusSnapshot`'s
    /// "per-country JSON maps"): `country -> kind -> count`.
    fn count_by_kind_and_country(
        &self,
        executor: &mut dyn QueryExecutor,
    ) -> PkdResult<std::collections::HashMap<String, std::collections::HashMap<String, i64>>>;
}

pub struct SqlCertificateRepository;

fn row_to_certificate(row: &crate::query::QueryRow) -> Option<Certificate> {
    Some(Certificate {
        id: uuid::Uuid::parse_str(row.text("id")?).ok()?,
        kind: match row.text("kind")? {
            "csca" => CertificateKind::Csca,
            "mlsc" => CertificateKind::Mlsc,
            "dsc" => CertificateKind::Dsc,
            "dsc-nc" => CertificateKind::DscNc,
            "lc" => CertificateKind::Lc,
            _ => return None,
        },
        country: row.text("country")?.to_string(),
        subject_dn: row.text("subject_dn")?.to_string(),
        issuer_dn: row.text("issuer_dn")?.to_string(),
        serial_hex: row.text("serial_hex")?.to_string(),
        fingerprint: row.text("fingerprint")?.to_string(),
        not_before: row.timestamp("not_before")?,
        not_after: row.timestamp("not_after")?,
        public_key_algorithm: row.text("public_key_algorithm")?.to_string(),
        public_key_size_bits: row.int("public_key_size_bits")? as u32,
        signature_algorithm: row.text("signature_algorithm")?.to_string(),
        der: row.bytes("der")?.to_vec(),
        directory_stored: row.bool("directory_stored")?,
        duplicate_count: row.int("duplicate_count")? as u32,
        last_seen_upload_id: row.text("last_seen_upload_id").and_then(|s| uuid::Uuid::parse_str(s).ok()),
        duplicates: Vec::new(),
        link_extra: None,
    })
}

impl CertificateRepository for SqlCertificateRepository {
    fn find_by_fingerprint(
        &self,
        executor: &mut dyn QueryExecutor,
        kind: CertificateKind,
        fingerprint: &str,
    ) -> PkdResult<Option<Certificate>> {
        let rows = executor.query(
            "SELECT * FROM certificates WHERE kind = ? AND fingerprint = ?",
            &[SqlValue::from(kind.directory_ou()), SqlValue::from(fingerprint)],
        )?;
        Ok(rows.first().and_then(row_to_certificate))
    }

    fn insert(&self, executor: &mut dyn QueryExecutor, certificate: &Certificate) -> PkdResult<()> {
        executor.execute(
            "INSERT INTO certificates (id, kind, country, subject_dn, issuer_dn, serial_hex, \
             fingerprint, not_before, not_after, public_key_algorithm, public_key_size_bits, \
             signature_algorithm, der, directory_stored, duplicate_count) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            &[
                SqlValue::from(certificate.id.to_string().as_str()),
                SqlValue::from(certificate.kind.directory_ou()),
                SqlValue::from(certificate.country.as_str()),
                SqlValue::from(certificate.subject_dn.as_str()),
                SqlValue::from(certificate.issuer_dn.as_str()),
                SqlValue::from(certificate.serial_hex.as_str()),
                SqlValue::from(certificate.fingerprint.as_str()),
                SqlValue::Timestamp(certificate.not_before),
                SqlValue::Timestamp(certificate.not_after),
                SqlValue::from(certificate.public_key_algorithm.as_str()),
                SqlValue::Int(certificate.public_key_size_bits as i64),
                SqlValue::from(certificate.signature_algorithm.as_str()),
                SqlValue::Bytes(certificate.der.clone()),
                SqlValue::Bool(certificate.directory_stored),
                SqlValue::Int(certificate.duplicate_count as i64),
            ],
        )?;
        Ok(())
    }

    fn record_duplicate(
        &self,
        executor: &mut dyn QueryExecutor,
        certificate_id: uuid::Uuid,
        observation: &DuplicateObservation,
    ) -> PkdResult<()> {
        executor.execute(
            "INSERT INTO certificate_duplicates (certificate_id, upload_id, source_type, observed_at) \
             VALUES (?, ?, ?, ?)",
            &[
                SqlValue::from(certificate_id.to_string().as_str()),
                SqlValue::from(observation.upload_id.to_string().as_str()),
                SqlValue::from(observation.source_type.as_str()),
                SqlValue::Timestamp(observation.observed_at),
            ],
        )?;
        executor.execute(
            "UPDATE certificates SET duplicate_count = duplicate_count + 1, last_seen_upload_id = ? WHERE id = ?",
            &[
                SqlValue::from(observation.upload_id.to_string().as_str()),
                SqlValue::from(certificate_id.to_string().as_str()),
            ],
        )?;
        Ok(())
    }

    fn find_by_subject(
        &self,
        executor: &mut dyn QueryExecutor,
        kind: CertificateKind,
        subject_dn: &str,
    ) -> PkdResult<Vec<Certificate>> {
        let rows = executor.query(
            "SELECT * FROM certificates WHERE kind = ? AND subject_dn = ?",
            &[SqlValue::from(kind.directory_ou()), SqlValue::from(subject_dn)],
        )?;
        Ok(rows.iter().filter_map(row_to_certificate).collect())
    }

    fn find_csca_by_country(
        &self,
        executor: &mut dyn QueryExecutor,
        country: &str,
    ) -> PkdResult<Vec<Certificate>> {
        let rows = executor.query(
            "SELECT * FROM certificates WHERE kind = 'csca' AND country = ?",
            &[SqlValue::from(country)],
        )?;
        Ok(rows.iter().filter_map(row_to_certificate).collect())
    }

    fn list_by_kind(
        &self,
        executor: &mut dyn QueryExecutor,
        kind: CertificateKind,
    ) -> PkdResult<Vec<Certificate>> {
        let rows = executor.query(
            "SELECT * FROM certificates WHERE kind = ?",
            &[SqlValue::from(kind.directory_ou())],
        )?;
        Ok(rows.iter().filter_map(row_to_certificate).collect())
    }

    fn list_not_directory_stored(
        &self,
        executor: &mut dyn QueryExecutor,
    ) -> PkdResult<Vec<Certificate>> {
        let rows = executor.query(
            "SELECT * FROM certificates WHERE directory_stored = ? AND kind != 'dsc-nc'",
            &[SqlValue::Bool(false)],
        )?;
        Ok(rows.iter().filter_map(row_to_certificate).collect())
    }

    fn mark_directory_stored(
        &self,
        executor: &mut dyn QueryExecutor,
        certificate_id: uuid::Uuid,
    ) -> PkdResult<()> {
        executor.execute(
            "UPDATE certificates SET directory_stored = ? WHERE id = ?",
            &[
                SqlValue::Bool(true),
                SqlValue::from(certificate_id.to_string().as_str()),
            ],
        )?;
        Ok(())
    }

    fn count_by_kind(&self, executor: &mut dyn QueryExecutor) -> PkdResult<std::collections::HashMap<String, i64>> {
        let rows = executor.query("SELECT kind, COUNT(*) AS total FROM certificates GROUP BY kind", &[])?;
        let mut counts = std::collections::HashMap::new();
        for row in rows {
            if let (Some(kind), Some(total)) = (row.text("kind"), row.int("total")) {
                counts.insert(kind.to_string(), total);
            }
        }
        Ok(counts)
    }

    fn count_by_kind_and_country(
        &self,
        executor: &mut dyn QueryExecutor,
    ) -> PkdResult<std::collections::HashMap<String, std::collections::HashMap<String, i64>>> {
        let rows = executor.query(
            "SELECT country, kind, COUNT(*) AS total FROM certificates GROUP BY country, kind",
            &[],
        )?;
        let mut by_country: std::collections::HashMap<String, std::collections::HashMap<String, i64>> =
            std::collections::HashMap::new();
        for row in rows {
            if let (Some(country), Some(kind), Some(total)) =
                (row.text("country"), row.text("kind"), row.int("total"))
            {
                by_country
                    .entry(country.to_string())
                    .or_default()
                    .insert(kind.to_string(), total);
            }
        }
        Ok(by_country)
    }
}

/// Stamps `observed_at = now()` for a fresh duplicate record; kept as a
/// free function since it has no repository-specific state.
pub fn observed_now(upload_id: uuid::Uuid, source_type: &str) -> DuplicateObservation {
    DuplicateObservation {
        upload_id,
        source_type: source_type.to_string(),
        observed_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observed_now_stamps_the_given_source() {
        let observation = observed_now(uuid::Uuid::new_v4(), "ldif");
        assert_eq!(observation.source_type, "ldif");
    }
}
