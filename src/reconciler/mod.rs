//! Two-Store Reconciler (spec §4.6): pushes DB rows not yet mirrored to
//! the directory, measures divergence, and runs the daily revalidation
//! sweep. A single `Mutex<()>` serializes runs crate-wide — a second
//! concurrent call fails fast with `PkdError::AlreadyRunning` rather than
//! racing the first run's directory writes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::Utc;
use ldap3::LdapConn;

use crate::directory::DirectoryAdapter;
use crate::error::{PkdError, PkdResult};
use crate::models::{
    CertificateKind, ReconciliationAction, ReconciliationLogEntry, ReconciliationOutcome,
    ReconciliationRun, ReconciliationTrigger, SyncStatusSnapshot, ValidationStatus,
};
use crate::query::QueryExecutor;
use crate::repositories::{
    CertificateRepository, CrlRepository, ReconciliationRepository, SyncStatusRepository,
    ValidationRepository,
};

pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Cross-thread re-entrancy guard (spec §4.6 "one run at a time"
/// implied by a single mutable `ReconciliationRun` in progress).
static RUN_IN_PROGRESS: AtomicBool = AtomicBool::new(false);

pub struct Reconciler<'a> {
    pub certificate_repo: &'a dyn CertificateRepository,
    pub crl_repo: &'a dyn CrlRepository,
    pub reconciliation_repo: &'a dyn ReconciliationRepository,
    pub validation_repo: &'a dyn ValidationRepository,
    pub sync_status_repo: &'a dyn SyncStatusRepository,
    pub directory: &'a DirectoryAdapter,
    pub batch_size: usize,
}

/// RAII guard releasing `RUN_IN_PROGRESS` on every exit path, including an
/// early `?` return from inside [`Reconciler::run`].
struct RunGuard;

impl RunGuard {
    fn acquire() -> PkdResult<Self> {
        if RUN_IN_PROGRESS.swap(true, Ordering::SeqCst) {
            return Err(PkdError::AlreadyRunning);
        }
        Ok(RunGuard)
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        RUN_IN_PROGRESS.store(false, Ordering::SeqCst);
    }
}

impl<'a> Reconciler<'a> {
    pub fn run(
        &self,
        executor: &mut dyn QueryExecutor,
        conn: &mut LdapConn,
        trigger: ReconciliationTrigger,
        dry_run: bool,
    ) -> PkdResult<ReconciliationRun> {
        let _guard = RunGuard::acquire()?;

        let mut run = ReconciliationRun::new(trigger, dry_run);
        self.reconciliation_repo.insert(executor, &run)?;

        let pending = self.certificate_repo.list_not_directory_stored(executor)?;
        for kind in [CertificateKind::Csca, CertificateKind::Dsc, CertificateKind::Lc, CertificateKind::Mlsc] {
            for certificate in pending.iter().filter(|c| c.kind == kind).take(self.batch_size).cloned() {
                let started = Instant::now();
                let outcome = if dry_run {
                    Ok(())
                } else {
                    self.directory.upsert_certificate(
                        conn,
                        certificate.kind,
                        &certificate.country,
                        &certificate.fingerprint,
                        &certificate.der,
                    )
                };
                let duration_ms = started.elapsed().as_millis() as u64;
                match outcome {
                    Ok(()) => {
                        if !dry_run {
                            self.certificate_repo.mark_directory_stored(executor, certificate.id)?;
                        }
                        run.record(ReconciliationLogEntry {
                            fingerprint: certificate.fingerprint.clone(),
                            kind,
                            country: certificate.country.clone(),
                            action: ReconciliationAction::Add,
                            outcome: ReconciliationOutcome::Success,
                            duration_ms,
                            error_message: None,
                        });
                    }
                    Err(e) => {
                        run.record(ReconciliationLogEntry {
                            fingerprint: certificate.fingerprint.clone(),
                            kind,
                            country: certificate.country.clone(),
                            action: ReconciliationAction::Add,
                            outcome: ReconciliationOutcome::Failed,
                            duration_ms,
                            error_message: Some(e.to_string()),
                        });
                    }
                }
            }
        }

        let crl_candidates = self.crl_repo.list_not_directory_stored(executor)?;
        for crl in crl_candidates.into_iter().take(self.batch_size) {
            let started = Instant::now();
            let outcome = if dry_run {
                Ok(())
            } else {
                self.directory.upsert_crl(conn, &crl.country, &crl.issuer_dn, &crl.der)
            };
            let duration_ms = started.elapsed().as_millis() as u64;
            match outcome {
                Ok(()) => {
                    if !dry_run {
                        self.crl_repo.mark_directory_stored(executor, crl.id)?;
                    }
                    run.record(ReconciliationLogEntry {
                        fingerprint: crl.fingerprint.clone(),
                        kind: CertificateKind::Csca, // CRLs have no certificate kind; bucketed under the issuing CSCA's OU.
                        country: crl.country.clone(),
                        action: ReconciliationAction::Add,
                        outcome: ReconciliationOutcome::Success,
                        duration_ms,
                        error_message: None,
                    });
                }
                Err(e) => {
                    run.record(ReconciliationLogEntry {
                        fingerprint: crl.fingerprint.clone(),
                        kind: CertificateKind::Csca,
                        country: crl.country.clone(),
                        action: ReconciliationAction::Add,
                        outcome: ReconciliationOutcome::Failed,
                        duration_ms,
                        error_message: Some(e.to_string()),
                    });
                }
            }
        }

        run.finish();
        self.reconciliation_repo.update(executor, &run)?;
        Ok(run)
    }

    /// Divergence measurement (spec §4.6): per-kind DB counts vs. directory
    /// counts obtained by a scoped search per (kind, country) pair, signed.
    pub fn measure_divergence(
        &self,
        executor: &mut dyn QueryExecutor,
        conn: &mut LdapConn,
    ) -> PkdResult<SyncStatusSnapshot> {
        let started = Instant::now();
        let mut db_counts = self.certificate_repo.count_by_kind(executor)?;
        let per_country_db_counts = self.certificate_repo.count_by_kind_and_country(executor)?;
        // DSC_NC is never synced to the directory (spec §4.6 step 2: "out
        // of scope (deprecated)"); its directory count is permanently zero,
        // so it must not enter the discrepancy computation at all.
        db_counts.remove(CertificateKind::DscNc.directory_ou());

        let countries: Vec<&String> = per_country_db_counts.keys().collect();
        let mut directory_counts: HashMap<String, i64> = HashMap::new();
        let mut per_country_directory_counts: HashMap<String, HashMap<String, i64>> = HashMap::new();
        for kind in [CertificateKind::Csca, CertificateKind::Dsc, CertificateKind::Lc, CertificateKind::Mlsc] {
            let mut total = 0;
            for country in &countries {
                let count = self.directory.count_certificates(conn, kind, country)?;
                per_country_directory_counts
                    .entry((*country).clone())
                    .or_default()
                    .insert(kind.directory_ou().to_string(), count);
                total += count;
            }
            directory_counts.insert(kind.directory_ou().to_string(), total);
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        let snapshot = SyncStatusSnapshot::compute_with_countries(
            db_counts,
            directory_counts,
            serde_json::json!(per_country_db_counts),
            serde_json::json!(per_country_directory_counts),
            duration_ms,
        );
        self.sync_status_repo.insert(executor, &snapshot)?;
        Ok(snapshot)
    }

    /// Daily revalidation sweep (spec §4.6): re-evaluates `validity_period_valid`
    /// for every stored validation result against the current time.
    pub fn revalidation_sweep(
        &self,
        executor: &mut dyn QueryExecutor,
    ) -> PkdResult<RevalidationSummary> {
        let started = Instant::now();
        let mut summary = RevalidationSummary::default();
        let now = Utc::now();

        for kind in [CertificateKind::Csca, CertificateKind::Dsc, CertificateKind::DscNc, CertificateKind::Lc, CertificateKind::Mlsc] {
            for certificate in self.certificate_repo.list_by_kind(executor, kind)? {
                let Some(mut result) = self.validation_repo.latest_for_certificate(executor, certificate.id)? else {
                    continue;
                };
                summary.total_processed += 1;
                let was_expired = result.currently_expired;
                let now_expired = certificate.is_expired(now);
                result.currently_expired = now_expired;
                result.status = match (was_expired, now_expired, result.status) {
                    (false, true, ValidationStatus::Valid) => {
                        summary.newly_expired += 1;
                        ValidationStatus::ExpiredValid
                    }
                    (true, false, ValidationStatus::ExpiredValid) => {
                        summary.newly_valid += 1;
                        ValidationStatus::Valid
                    }
                    (_, _, status) => {
                        summary.unchanged += 1;
                        status
                    }
                };
                result.evaluated_at = now;
                if self.validation_repo.insert(executor, &result).is_err() {
                    summary.errors += 1;
                }
            }
        }
        summary.duration_ms = started.elapsed().as_millis() as u64;
        Ok(summary)
    }
}

#[derive(Debug, Default, Clone)]
pub struct RevalidationSummary {
    pub total_processed: u64,
    pub newly_expired: u64,
    pub newly_valid: u64,
    pub unchanged: u64,
    pub errors: u64,
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revalidation_summary_defaults_to_zero() {
        let summary = RevalidationSummary::default();
        assert_eq!(summary.total_processed, 0);
        assert_eq!(summary.errors, 0);
    }
}
