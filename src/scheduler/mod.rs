//! In-process timer loop (spec §4.8): daily reconciliation, daily
//! revalidation sweep, and periodic external-catalog version polling.
//! Built on `clokwerk`, grounded in the retrieved `krill` RPKI daemon,
//! which schedules its own republish/housekeeping jobs with the same
//! crate rather than pulling in a full async runtime for a handful of
//! cron-like ticks.
//!
//! Single-threaded and cooperative: `run_pending` drives every due job to
//! completion on the scheduler's own thread before the next tick is even
//! considered, so a slow reconciliation run simply delays the next check
//! rather than overlapping it (spec §4.8, §5).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use clokwerk::{Scheduler as ClokwerkScheduler, TimeUnits};
use log::{error, info, warn};

use crate::models::{CatalogNotification, ReconciliationTrigger};
use crate::reconciler::Reconciler;
use crate::service::ServiceContainer;

/// Queries the operator-configured upstream catalog for its published
/// version identifier. No concrete transport ships with this crate (the
/// upstream catalog's API is deployment-specific); callers supply their
/// own implementation and the scheduler only compares what it returns
/// against [`crate::repositories::CatalogRepository::last_known_version`].
pub trait CatalogPoller: Send + Sync {
    fn poll_version(&self) -> Option<String>;
}

/// Used where no upstream transport has been configured yet; reports no
/// version, so the poll tick is a no-op rather than a spurious notification.
pub struct NullCatalogPoller;

impl CatalogPoller for NullCatalogPoller {
    fn poll_version(&self) -> Option<String> {
        None
    }
}

/// Owns the background thread that drives `clokwerk`'s tick loop.
/// Dropping it (or calling [`PkdScheduler::stop`]) signals the loop to
/// exit after its current `run_pending` call returns.
pub struct PkdScheduler {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const CATALOG_POLL_INTERVAL_MINUTES: u32 = 60;

impl PkdScheduler {
    /// Registers the three jobs named in spec §4.8 and starts the tick
    /// loop on a dedicated thread. Returns immediately; does nothing if
    /// `scheduler-enabled` is false in configuration.
    pub fn start(services: Arc<ServiceContainer>, poller: Arc<dyn CatalogPoller>) -> Option<Self> {
        if !services.config.scheduler_enabled {
            info!("scheduler disabled via configuration, not starting");
            return None;
        }

        let mut scheduler = ClokwerkScheduler::new();
        let reconcile_hour = services.config.scheduler_reconcile_hour as u32;
        let reconcile_time = format!("{reconcile_hour:02}:00");

        {
            let services = services.clone();
            scheduler
                .every(1.day())
                .at(&reconcile_time)
                .run(move || run_reconciliation(&services));
        }
        {
            let services = services.clone();
            scheduler
                .every(1.day())
                .at(&reconcile_time)
                .run(move || run_revalidation(&services));
        }
        {
            let services = services.clone();
            let poller = poller.clone();
            scheduler
                .every(CATALOG_POLL_INTERVAL_MINUTES.minutes())
                .run(move || run_catalog_poll(&services, poller.as_ref()));
        }

        let stop = Arc::new(AtomicBool::new(false));
        let loop_stop = stop.clone();
        let handle = std::thread::spawn(move || {
            info!("scheduler started, reconciliation pinned to {reconcile_time}");
            while !loop_stop.load(Ordering::SeqCst) {
                scheduler.run_pending();
                std::thread::sleep(POLL_INTERVAL);
            }
            info!("scheduler stopped");
        });

        Some(PkdScheduler { stop, handle: Some(handle) })
    }

    pub fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PkdScheduler {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_reconciliation(services: &Arc<ServiceContainer>) {
    let mut executor = match services.db_pool.acquire() {
        Ok(guard) => guard,
        Err(e) => {
            error!("scheduled reconciliation could not acquire a database connection: {e}");
            return;
        }
    };
    let mut conn = match services.directory_pool.acquire() {
        Ok(guard) => guard,
        Err(e) => {
            error!("scheduled reconciliation could not acquire a directory connection: {e}");
            return;
        }
    };
    let reconciler = Reconciler {
        certificate_repo: services.certificate_repo.as_ref(),
        crl_repo: services.crl_repo.as_ref(),
        reconciliation_repo: services.reconciliation_repo.as_ref(),
        validation_repo: services.validation_repo.as_ref(),
        sync_status_repo: services.sync_status_repo.as_ref(),
        directory: &services.directory,
        batch_size: crate::reconciler::DEFAULT_BATCH_SIZE,
    };
    match reconciler.run(&mut **executor, &mut conn, ReconciliationTrigger::Scheduled, false) {
        Ok(run) => info!(
            "scheduled reconciliation completed: {} entries processed",
            run.log.len()
        ),
        Err(e) => error!("scheduled reconciliation failed: {e}"),
    }
}

fn run_revalidation(services: &Arc<ServiceContainer>) {
    if !services.config.scheduler_revalidate_on_sync {
        return;
    }
    let mut executor = match services.db_pool.acquire() {
        Ok(guard) => guard,
        Err(e) => {
            error!("scheduled revalidation could not acquire a database connection: {e}");
            return;
        }
    };
    let reconciler = Reconciler {
        certificate_repo: services.certificate_repo.as_ref(),
        crl_repo: services.crl_repo.as_ref(),
        reconciliation_repo: services.reconciliation_repo.as_ref(),
        validation_repo: services.validation_repo.as_ref(),
        sync_status_repo: services.sync_status_repo.as_ref(),
        directory: &services.directory,
        batch_size: crate::reconciler::DEFAULT_BATCH_SIZE,
    };
    match reconciler.revalidation_sweep(&mut **executor) {
        Ok(summary) => info!(
            "scheduled revalidation swept {} certificates ({} newly expired, {} newly valid)",
            summary.total_processed, summary.newly_expired, summary.newly_valid
        ),
        Err(e) => error!("scheduled revalidation failed: {e}"),
    }
}

/// Compares the upstream catalog's current version against what was last
/// recorded. A difference is logged and persisted as a [`CatalogNotification`];
/// nothing is downloaded automatically (spec §4.8 is explicit that the
/// notification is the entire effect of this job).
fn run_catalog_poll(services: &Arc<ServiceContainer>, poller: &dyn CatalogPoller) {
    let Some(observed) = poller.poll_version() else {
        return;
    };
    let mut executor = match services.db_pool.acquire() {
        Ok(guard) => guard,
        Err(e) => {
            error!("catalog poll could not acquire a database connection: {e}");
            return;
        }
    };
    let previous = match services.catalog_repo.last_known_version(&mut **executor) {
        Ok(previous) => previous,
        Err(e) => {
            error!("catalog poll could not read the last known version: {e}");
            return;
        }
    };
    if previous.as_deref() == Some(observed.as_str()) {
        return;
    }
    warn!("external catalog version changed: {previous:?} -> {observed}");
    let notification = CatalogNotification::new(observed, previous);
    if let Err(e) = services.catalog_repo.insert(&mut **executor, &notification) {
        error!("failed to persist catalog notification: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_poller_reports_no_version() {
        assert!(NullCatalogPoller.poll_version().is_none());
    }
}
