//! In-memory repository fakes for tests (SPEC_FULL.md Test tooling
//! section). These satisfy the same traits as the SQL-backed
//! repositories, ignoring the `&mut dyn QueryExecutor` argument entirely —
//! tests exercise trust-chain, reconciliation, and PA logic without a
//! live database or directory.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::PkdResult;
use crate::models::{
    CatalogNotification, Certificate, CertificateKind, Crl, DeviationListRecord,
    DuplicateObservation, MasterList, PaVerification, ReconciliationRun, SyncStatusSnapshot,
    Upload, ValidationResult,
};
use crate::query::QueryExecutor;
use crate::repositories::{
    CatalogRepository, CertificateRepository, CrlRepository, MasterListRepository, PaRepository,
    ReconciliationRepository, SyncStatusRepository, UploadRepository, ValidationRepository,
};

#[derive(Default)]
pub struct InMemoryCertificateRepository {
    certificates: Mutex<Vec<Certificate>>,
}

impl CertificateRepository for InMemoryCertificateRepository {
    fn find_by_fingerprint(
        &self,
        _executor: &mut dyn QueryExecutor,
        kind: CertificateKind,
        fingerprint: &str,
    ) -> PkdResult<Option<Certificate>> {
        let certs = self.certificates.lock().unwrap();
        Ok(certs
            .iter()
            .find(|c| c.kind == kind && c.fingerprint == fingerprint)
            .cloned())
    }

    fn insert(&self, _executor: &mut dyn QueryExecutor, certificate: &Certificate) -> PkdResult<()> {
        self.certificates.lock().unwrap().push(certificate.clone());
        Ok(())
    }

    fn record_duplicate(
        &self,
        _executor: &mut dyn QueryExecutor,
        certificate_id: uuid::Uuid,
        observation: &DuplicateObservation,
    ) -> PkdResult<()> {
        let mut certs = self.certificates.lock().unwrap();
        if let Some(cert) = certs.iter_mut().find(|c| c.id == certificate_id) {
            cert.duplicate_count += 1;
            cert.last_seen_upload_id = Some(observation.upload_id);
            cert.duplicates.push(observation.clone());
        }
        Ok(())
    }

    fn find_by_subject(
        &self,
        _executor: &mut dyn QueryExecutor,
        kind: CertificateKind,
        subject_dn: &str,
    ) -> PkdResult<Vec<Certificate>> {
        let certs = self.certificates.lock().unwrap();
        Ok(certs
            .iter()
            .filter(|c| c.kind == kind && c.subject_dn == subject_dn)
            .cloned()
            .collect())
    }

    fn find_csca_by_country(
        &self,
        _executor: &mut dyn QueryExecutor,
        country: &str,
    ) -> PkdResult<Vec<Certificate>> {
        let certs = self.certificates.lock().unwrap();
        Ok(certs
            .iter()
            .filter(|c| c.kind == CertificateKind::Csca && c.country == country)
            .cloned()
            .collect())
    }

    fn list_by_kind(
        &self,
        _executor: &mut dyn QueryExecutor,
        kind: CertificateKind,
    ) -> PkdResult<Vec<Certificate>> {
        let certs = self.certificates.lock().unwrap();
        Ok(certs.iter().filter(|c| c.kind == kind).cloned().collect())
    }

    fn list_not_directory_stored(
        &self,
        _executor: &mut dyn QueryExecutor,
    ) -> PkdResult<Vec<Certificate>> {
        let certs = self.certificates.lock().unwrap();
        Ok(certs
            .iter()
            .filter(|c| !c.directory_stored && c.kind.directory_syncable())
            .cloned()
            .collect())
    }

    fn mark_directory_stored(
        &self,
        _executor: &mut dyn QueryExecutor,
        certificate_id: uuid::Uuid,
    ) -> PkdResult<()> {
        let mut certs = self.certificates.lock().unwrap();
        if let Some(cert) = certs.iter_mut().find(|c| c.id == certificate_id) {
            cert.directory_stored = true;
        }
        Ok(())
    }

    fn count_by_kind(&self, _executor: &mut dyn QueryExecutor) -> PkdResult<HashMap<String, i64>> {
        let certs = self.certificates.lock().unwrap();
        let mut counts = HashMap::new();
        for cert in certs.iter() {
            *counts.entry(cert.kind.to_string()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    fn count_by_kind_and_country(
        &self,
        _executor: &mut dyn QueryExecutor,
    ) -> PkdResult<HashMap<String, HashMap<String, i64>>> {
        let certs = self.certificates.lock().unwrap();
        let mut by_country: HashMap<String, HashMap<String, i64>> = HashMap::new();
        for cert in certs.iter() {
            *by_country
                .entry(cert.country.clone())
                .or_default()
                .entry(cert.kind.to_string())
                .or_insert(0) += 1;
        }
        Ok(by_country)
    }
}

#[derive(Default)]
pub struct InMemoryCrlRepository {
    crls: Mutex<Vec<Crl>>,
}

impl CrlRepository for InMemoryCrlRepository {
    fn find_by_issuer(&self, _executor: &mut dyn QueryExecutor, issuer_dn: &str) -> PkdResult<Option<Crl>> {
        let crls = self.crls.lock().unwrap();
        Ok(crls
            .iter()
            .filter(|c| c.issuer_dn == issuer_dn)
            .max_by_key(|c| c.this_update)
            .cloned())
    }

    fn upsert(&self, _executor: &mut dyn QueryExecutor, crl: &Crl) -> PkdResult<()> {
        let mut crls = self.crls.lock().unwrap();
        if let Some(existing) = crls.iter_mut().find(|c| c.issuer_dn == crl.issuer_dn) {
            *existing = crl.clone();
        } else {
            crls.push(crl.clone());
        }
        Ok(())
    }

    fn list_not_directory_stored(&self, _executor: &mut dyn QueryExecutor) -> PkdResult<Vec<Crl>> {
        let crls = self.crls.lock().unwrap();
        Ok(crls.iter().filter(|c| !c.directory_stored).cloned().collect())
    }

    fn mark_directory_stored(&self, _executor: &mut dyn QueryExecutor, crl_id: uuid::Uuid) -> PkdResult<()> {
        let mut crls = self.crls.lock().unwrap();
        if let Some(crl) = crls.iter_mut().find(|c| c.id == crl_id) {
            crl.directory_stored = true;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryMasterListRepository {
    masterlists: Mutex<Vec<MasterList>>,
    deviation_lists: Mutex<Vec<DeviationListRecord>>,
}

impl MasterListRepository for InMemoryMasterListRepository {
    fn insert(&self, _executor: &mut dyn QueryExecutor, masterlist: &MasterList) -> PkdResult<()> {
        self.masterlists.lock().unwrap().push(masterlist.clone());
        Ok(())
    }

    fn find_by_fingerprint(&self, _executor: &mut dyn QueryExecutor, fingerprint: &str) -> PkdResult<Option<MasterList>> {
        let lists = self.masterlists.lock().unwrap();
        Ok(lists.iter().find(|m| m.fingerprint == fingerprint).cloned())
    }

    fn insert_deviation_list(&self, _executor: &mut dyn QueryExecutor, record: &DeviationListRecord) -> PkdResult<()> {
        self.deviation_lists.lock().unwrap().push(record.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryUploadRepository {
    uploads: Mutex<Vec<Upload>>,
}

impl UploadRepository for InMemoryUploadRepository {
    fn insert(&self, _executor: &mut dyn QueryExecutor, upload: &Upload) -> PkdResult<()> {
        self.uploads.lock().unwrap().push(upload.clone());
        Ok(())
    }

    fn find_by_sha256(&self, _executor: &mut dyn QueryExecutor, sha256: &str) -> PkdResult<Option<Upload>> {
        let uploads = self.uploads.lock().unwrap();
        Ok(uploads.iter().find(|u| u.sha256 == sha256).cloned())
    }

    fn find_by_id(&self, _executor: &mut dyn QueryExecutor, id: uuid::Uuid) -> PkdResult<Option<Upload>> {
        let uploads = self.uploads.lock().unwrap();
        Ok(uploads.iter().find(|u| u.id == id).cloned())
    }

    fn update_progress(&self, _executor: &mut dyn QueryExecutor, upload: &Upload) -> PkdResult<()> {
        let mut uploads = self.uploads.lock().unwrap();
        if let Some(existing) = uploads.iter_mut().find(|u| u.id == upload.id) {
            *existing = upload.clone();
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryValidationRepository {
    results: Mutex<Vec<ValidationResult>>,
}

impl ValidationRepository for InMemoryValidationRepository {
    fn insert(&self, _executor: &mut dyn QueryExecutor, result: &ValidationResult) -> PkdResult<()> {
        self.results.lock().unwrap().push(result.clone());
        Ok(())
    }

    fn latest_for_certificate(
        &self,
        _executor: &mut dyn QueryExecutor,
        certificate_id: uuid::Uuid,
    ) -> PkdResult<Option<ValidationResult>> {
        let results = self.results.lock().unwrap();
        Ok(results
            .iter()
            .filter(|r| r.certificate_id == certificate_id)
            .max_by_key(|r| r.evaluated_at)
            .cloned())
    }
}

#[derive(Default)]
pub struct InMemoryReconciliationRepository {
    runs: Mutex<Vec<ReconciliationRun>>,
}

impl ReconciliationRepository for InMemoryReconciliationRepository {
    fn insert(&self, _executor: &mut dyn QueryExecutor, run: &ReconciliationRun) -> PkdResult<()> {
        self.runs.lock().unwrap().push(run.clone());
        Ok(())
    }

    fn update(&self, _executor: &mut dyn QueryExecutor, run: &ReconciliationRun) -> PkdResult<()> {
        let mut runs = self.runs.lock().unwrap();
        if let Some(existing) = runs.iter_mut().find(|r| r.id == run.id) {
            *existing = run.clone();
        }
        Ok(())
    }

    fn most_recent(&self, _executor: &mut dyn QueryExecutor) -> PkdResult<Option<ReconciliationRun>> {
        let runs = self.runs.lock().unwrap();
        Ok(runs.iter().max_by_key(|r| r.started_at).cloned())
    }
}

#[derive(Default)]
pub struct InMemorySyncStatusRepository {
    snapshots: Mutex<Vec<SyncStatusSnapshot>>,
}

impl SyncStatusRepository for InMemorySyncStatusRepository {
    fn insert(&self, _executor: &mut dyn QueryExecutor, snapshot: &SyncStatusSnapshot) -> PkdResult<()> {
        self.snapshots.lock().unwrap().push(snapshot.clone());
        Ok(())
    }

    fn most_recent(&self, _executor: &mut dyn QueryExecutor) -> PkdResult<Option<SyncStatusSnapshot>> {
        let snapshots = self.snapshots.lock().unwrap();
        Ok(snapshots.iter().max_by_key(|s| s.snapshot_time).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryPaRepository {
    verifications: Mutex<Vec<PaVerification>>,
}

impl PaRepository for InMemoryPaRepository {
    fn insert(&self, _executor: &mut dyn QueryExecutor, verification: &PaVerification) -> PkdResult<()> {
        self.verifications.lock().unwrap().push(verification.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryCatalogRepository {
    notifications: Mutex<Vec<CatalogNotification>>,
}

impl CatalogRepository for InMemoryCatalogRepository {
    fn insert(&self, _executor: &mut dyn QueryExecutor, notification: &CatalogNotification) -> PkdResult<()> {
        self.notifications.lock().unwrap().push(notification.clone());
        Ok(())
    }

    fn last_known_version(&self, _executor: &mut dyn QueryExecutor) -> PkdResult<Option<String>> {
        let notifications = self.notifications.lock().unwrap();
        Ok(notifications.iter().max_by_key(|n| n.detected_at).map(|n| n.detected_version.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CertificateKind;
    use chrono::Utc;

    fn sample_certificate(kind: CertificateKind, fingerprint: &str) -> Certificate {
        Certificate {
            id: uuid::Uuid::new_v4(),
            kind,
            country: "KR".to_string(),
            subject_dn: "CN=KR DSC".to_string(),
            issuer_dn: "CN=KR CSCA".to_string(),
            serial_hex: "01".to_string(),
            fingerprint: fingerprint.to_string(),
            not_before: Utc::now(),
            not_after: Utc::now(),
            public_key_algorithm: "RSA".to_string(),
            public_key_size_bits: 2048,
            signature_algorithm: "SHA256withRSA".to_string(),
            der: vec![],
            directory_stored: false,
            duplicate_count: 0,
            last_seen_upload_id: None,
            duplicates: vec![],
            link_extra: None,
        }
    }

    struct NullExecutor;
    impl QueryExecutor for NullExecutor {
        fn query(&mut self, _sql: &str, _params: &[crate::query::SqlValue]) -> PkdResult<Vec<crate::query::QueryRow>> {
            Ok(vec![])
        }
        fn execute(&mut self, _sql: &str, _params: &[crate::query::SqlValue]) -> PkdResult<u64> {
            Ok(0)
        }
        fn transaction(
            &mut self,
            body: &mut dyn FnMut(&mut dyn QueryExecutor) -> PkdResult<()>,
        ) -> PkdResult<()> {
            body(self)
        }
    }

    #[test]
    fn insert_then_find_by_fingerprint_round_trips() {
        let repo = InMemoryCertificateRepository::default();
        let mut executor = NullExecutor;
        let cert = sample_certificate(CertificateKind::Dsc, "f".repeat(64).as_str());
        repo.insert(&mut executor, &cert).unwrap();
        let found = repo
            .find_by_fingerprint(&mut executor, CertificateKind::Dsc, &"f".repeat(64))
            .unwrap();
        assert!(found.is_some());
    }

    #[test]
    fn dsc_nc_is_excluded_from_unsynced_listing() {
        let repo = InMemoryCertificateRepository::default();
        let mut executor = NullExecutor;
        repo.insert(&mut executor, &sample_certificate(CertificateKind::DscNc, &"a".repeat(64)))
            .unwrap();
        let unsynced = repo.list_not_directory_stored(&mut executor).unwrap();
        assert!(unsynced.is_empty());
    }

    #[test]
    fn catalog_repository_tracks_the_most_recently_detected_version() {
        let repo = InMemoryCatalogRepository::default();
        let mut executor = NullExecutor;
        repo.insert(&mut executor, &CatalogNotification::new("2024-1".to_string(), None)).unwrap();
        repo.insert(&mut executor, &CatalogNotification::new("2024-2".to_string(), Some("2024-1".to_string()))).unwrap();
        assert_eq!(repo.last_known_version(&mut executor).unwrap().as_deref(), Some("2024-2"));
    }
}
