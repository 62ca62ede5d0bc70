//! `pkd-ctl`: a thin local CLI standing in for the out-of-scope HTTP
//! gateway (SPEC_FULL.md External interfaces) during development and
//! operator troubleshooting. Every subcommand talks to the same
//! [`pkd_core::service::ServiceContainer`] the (future) server process
//! would build; this binary is the only place in the crate allowed to
//! print to stdout/stderr directly, everything else logs via `log`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::info;

use pkd_core::config::Config;
use pkd_core::error::PkdResult;
use pkd_core::models::{Upload, UploadMode};
use pkd_core::pa::{PaRequest, PaVerifier};
use pkd_core::parser::pipeline::{process_upload, ProcessContext};
use pkd_core::parser::sniff_format;
use pkd_core::reconciler::Reconciler;
use pkd_core::scheduler::{NullCatalogPoller, PkdScheduler};
use pkd_core::service::ServiceContainer;
use pkd_core::models::ReconciliationTrigger;

#[derive(Parser)]
#[command(name = "pkd-ctl", about = "Operate a Local Public Key Directory instance")]
struct Cli {
    #[arg(long, default_value = "pkd.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingests a single file from disk through the same pipeline an
    /// upload would take.
    Ingest {
        path: PathBuf,
        #[arg(long, value_enum, default_value = "auto")]
        mode: CliUploadMode,
    },
    /// Verifies a SOD (plus optional Data Group files) via Passive
    /// Authentication and prints the verdict.
    Verify {
        sod_path: PathBuf,
        #[arg(long = "dg", value_name = "NUMBER=PATH")]
        data_groups: Vec<String>,
    },
    /// Runs one reconciliation pass between the database and the
    /// directory, then exits.
    Reconcile {
        #[arg(long)]
        dry_run: bool,
    },
    /// Measures DB/directory divergence without repairing it, and prints
    /// the resulting snapshot.
    Check,
    /// Starts the background scheduler and blocks until interrupted.
    Serve,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum CliUploadMode {
    Auto,
    Manual,
}

impl From<CliUploadMode> for UploadMode {
    fn from(mode: CliUploadMode) -> Self {
        match mode {
            CliUploadMode::Auto => UploadMode::Auto,
            CliUploadMode::Manual => UploadMode::Manual,
        }
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("pkd-ctl: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> PkdResult<()> {
    let config = Config::load(&cli.config)?;
    let services = Arc::new(ServiceContainer::build(config)?);

    match cli.command {
        Command::Ingest { path, mode } => ingest(&services, &path, mode.into()),
        Command::Verify { sod_path, data_groups } => verify(&services, &sod_path, &data_groups),
        Command::Reconcile { dry_run } => reconcile(&services, dry_run),
        Command::Check => check(&services),
        Command::Serve => serve(services),
    }
}

fn ingest(services: &ServiceContainer, path: &PathBuf, mode: UploadMode) -> PkdResult<()> {
    let bytes = std::fs::read(path)
        .map_err(|e| pkd_core::error::PkdError::Parse(format!("reading {}: {e}", path.display())))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    let format = sniff_format(&bytes, &filename)?;
    let sha256 = pkd_core::pki::digest::sha256_hex(&bytes);

    let mut executor = services.db_pool.acquire()?;
    if let Some(existing) = services.upload_repo.find_by_sha256(&mut **executor, &sha256)? {
        return Err(pkd_core::error::PkdError::DuplicateFile(existing.sha256));
    }

    let upload = Upload::new(filename, bytes.len() as u64, sha256, format, mode);
    services.upload_repo.insert(&mut **executor, &upload)?;

    let ctx = ProcessContext {
        certificate_repo: services.certificate_repo.as_ref(),
        crl_repo: services.crl_repo.as_ref(),
        masterlist_repo: services.masterlist_repo.as_ref(),
        upload_repo: services.upload_repo.as_ref(),
        progress: &services.progress,
    };
    let finished = process_upload(&ctx, &mut **executor, upload, &bytes)?;
    info!(
        "ingest of {} finished as {:?}: {} total entries",
        finished.original_filename, finished.state, finished.total_entries
    );
    println!(
        "{}: {:?} ({} entries, {} duplicates skipped)",
        finished.original_filename,
        finished.state,
        finished.total_entries,
        finished.per_kind_duplicates.values().sum::<u64>()
    );
    Ok(())
}

fn verify(services: &ServiceContainer, sod_path: &PathBuf, dg_args: &[String]) -> PkdResult<()> {
    let sod_bytes = std::fs::read(sod_path)
        .map_err(|e| pkd_core::error::PkdError::Parse(format!("reading {}: {e}", sod_path.display())))?;

    let mut data_groups = std::collections::BTreeMap::new();
    for arg in dg_args {
        let (number_str, path_str) = arg.split_once('=').ok_or_else(|| {
            pkd_core::error::PkdError::Parse(format!("expected NUMBER=PATH, got {arg}"))
        })?;
        let number: u8 = number_str
            .parse()
            .map_err(|_| pkd_core::error::PkdError::Parse(format!("invalid DG number {number_str}")))?;
        let bytes = std::fs::read(path_str)
            .map_err(|e| pkd_core::error::PkdError::Parse(format!("reading {path_str}: {e}")))?;
        data_groups.insert(number, bytes);
    }

    let request = PaRequest {
        sod_bytes: &sod_bytes,
        data_groups,
        issuing_country_hint: None,
        document_number_hint: None,
        client_ip: None,
        user_agent: None,
    };
    let verifier = PaVerifier::new(services.certificate_repo.as_ref(), services.crl_repo.as_ref());
    let mut executor = services.db_pool.acquire()?;
    let verdict = verifier.verify(&mut **executor, &request)?;

    println!("status: {:?}", verdict.status);
    println!("trust_chain_valid: {}", verdict.trust_chain_valid);
    println!("sod_signature_valid: {}", verdict.sod_signature_valid);
    println!("dg_hashes_valid: {}", verdict.dg_hashes_valid);
    println!("crl_valid: {}", verdict.crl_valid);
    for reason in &verdict.reasons {
        println!("reason: {reason}");
    }
    Ok(())
}

fn reconcile(services: &ServiceContainer, dry_run: bool) -> PkdResult<()> {
    let reconciler = Reconciler {
        certificate_repo: services.certificate_repo.as_ref(),
        crl_repo: services.crl_repo.as_ref(),
        reconciliation_repo: services.reconciliation_repo.as_ref(),
        validation_repo: services.validation_repo.as_ref(),
        sync_status_repo: services.sync_status_repo.as_ref(),
        directory: &services.directory,
        batch_size: pkd_core::reconciler::DEFAULT_BATCH_SIZE,
    };
    let mut executor = services.db_pool.acquire()?;
    let mut conn = services.directory_pool.acquire()?;
    let run = reconciler.run(&mut **executor, &mut conn, ReconciliationTrigger::Manual, dry_run)?;
    println!(
        "reconciliation {:?}: {} added, {} failed",
        run.status, run.success_count, run.failed_count
    );
    Ok(())
}

fn check(services: &ServiceContainer) -> PkdResult<()> {
    let reconciler = Reconciler {
        certificate_repo: services.certificate_repo.as_ref(),
        crl_repo: services.crl_repo.as_ref(),
        reconciliation_repo: services.reconciliation_repo.as_ref(),
        validation_repo: services.validation_repo.as_ref(),
        sync_status_repo: services.sync_status_repo.as_ref(),
        directory: &services.directory,
        batch_size: pkd_core::reconciler::DEFAULT_BATCH_SIZE,
    };
    let mut executor = services.db_pool.acquire()?;
    let mut conn = services.directory_pool.acquire()?;
    let snapshot = reconciler.measure_divergence(&mut **executor, &mut conn)?;
    println!("overall_status: {:?}", snapshot.overall_status);
    for (kind, discrepancy) in &snapshot.discrepancies {
        println!("{kind}: discrepancy {discrepancy}");
    }
    Ok(())
}

fn serve(services: Arc<ServiceContainer>) -> PkdResult<()> {
    let Some(scheduler) = PkdScheduler::start(services, Arc::new(NullCatalogPoller)) else {
        info!("scheduler-enabled is false, nothing to serve");
        return Ok(());
    };
    info!("pkd-ctl serve: scheduler running, press Ctrl+C to stop");
    ctrlc_wait();
    scheduler.stop();
    Ok(())
}

/// Blocks until the process receives an interrupt. No signal-handling
/// crate is in the dependency stack, so this parks the thread and relies
/// on the OS default SIGINT behaviour to terminate the process.
fn ctrlc_wait() {
    loop {
        std::thread::sleep(std::time::Duration::from_secs(3600));
    }
}
