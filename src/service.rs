//! Application wiring (Design Notes: "lift shared mutable global state —
//! pools, repositories, configuration — into one explicit struct built
//! once at startup" rather than reaching for ad hoc statics). Every
//! long-lived collaborator the rest of the crate needs is constructed
//! here exactly once and handed out as a shared reference.

use std::sync::Arc;

use crate::config::Config;
use crate::directory::DirectoryAdapter;
use crate::error::PkdResult;
use crate::parser::pipeline::ProgressHub;
use crate::pool::db_pool::build_db_pool;
use crate::pool::directory_pool::build_directory_pool;
use crate::pool::Pool;
use crate::query::QueryExecutor;
use crate::repositories::catalog_repo::SqlCatalogRepository;
use crate::repositories::certificate_repo::SqlCertificateRepository;
use crate::repositories::crl_repo::SqlCrlRepository;
use crate::repositories::masterlist_repo::SqlMasterListRepository;
use crate::repositories::pa_repo::SqlPaRepository;
use crate::repositories::reconciliation_repo::SqlReconciliationRepository;
use crate::repositories::sync_status_repo::SqlSyncStatusRepository;
use crate::repositories::upload_repo::SqlUploadRepository;
use crate::repositories::validation_repo::SqlValidationRepository;
use crate::repositories::{
    CatalogRepository, CertificateRepository, CrlRepository, MasterListRepository, PaRepository,
    ReconciliationRepository, SyncStatusRepository, UploadRepository, ValidationRepository,
};
use ldap3::LdapConn;

/// Everything the scheduler, the reconciler, the PA verifier and the CLI
/// binary need, built once from [`Config`]. Repository fields are trait
/// objects so the production (SQL-backed) and test (in-memory) variants
/// are interchangeable without touching call sites — the same substitution
/// the teacher's own test builds make for its storage layer.
pub struct ServiceContainer {
    pub config: Config,
    pub db_pool: Pool<Box<dyn QueryExecutor>>,
    pub directory_pool: Pool<LdapConn>,
    pub directory: DirectoryAdapter,
    pub progress: ProgressHub,

    pub certificate_repo: Arc<dyn CertificateRepository + Send + Sync>,
    pub crl_repo: Arc<dyn CrlRepository + Send + Sync>,
    pub masterlist_repo: Arc<dyn MasterListRepository + Send + Sync>,
    pub upload_repo: Arc<dyn UploadRepository + Send + Sync>,
    pub validation_repo: Arc<dyn ValidationRepository + Send + Sync>,
    pub reconciliation_repo: Arc<dyn ReconciliationRepository + Send + Sync>,
    pub sync_status_repo: Arc<dyn SyncStatusRepository + Send + Sync>,
    pub pa_repo: Arc<dyn PaRepository + Send + Sync>,
    pub catalog_repo: Arc<dyn CatalogRepository + Send + Sync>,
}

impl ServiceContainer {
    /// Builds every pool and repository from `config`. The SQL repositories
    /// are zero-sized dispatch structs (spec §4.2: the pooled connection,
    /// not the repository, is the stateful half of persistence), so
    /// constructing them here is just naming the production wiring; a test
    /// harness assembles the same struct with `repositories::in_memory`
    /// fakes instead.
    pub fn build(config: Config) -> PkdResult<Self> {
        let db_pool = build_db_pool(&config)?;
        let directory_pool = build_directory_pool(&config)?;
        let directory = DirectoryAdapter::new(config.directory_base_dn.clone());

        Ok(ServiceContainer {
            config,
            db_pool,
            directory_pool,
            directory,
            progress: ProgressHub::default(),

            certificate_repo: Arc::new(SqlCertificateRepository),
            crl_repo: Arc::new(SqlCrlRepository),
            masterlist_repo: Arc::new(SqlMasterListRepository),
            upload_repo: Arc::new(SqlUploadRepository),
            validation_repo: Arc::new(SqlValidationRepository),
            reconciliation_repo: Arc::new(SqlReconciliationRepository),
            sync_status_repo: Arc::new(SqlSyncStatusRepository),
            pa_repo: Arc::new(SqlPaRepository),
            catalog_repo: Arc::new(SqlCatalogRepository),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_fails_fast_when_the_database_is_unreachable() {
        // No live Postgres/Oracle/LDAP in a unit-test sandbox: `build`
        // must surface that as an error rather than hang or panic, since
        // the min-pool warm-up connects eagerly.
        let config = Config::default();
        assert!(ServiceContainer::build(config).is_err());
    }
}
