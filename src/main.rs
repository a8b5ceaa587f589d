// Allow panic/unwrap/expect in tests (denied globally via Cargo.toml lints)
#![cfg_attr(
    test,
    allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)
)]

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use modelsync::cleanup::{cleanup_store, CleanupOptions};
use modelsync::config::load_config;
use modelsync::fingerprint::{Level, LevelSelector};
use modelsync::fleet::{export_model_list, group_by_count, verify_counts};
use modelsync::ledger::{load_ledger, Ledger};
use modelsync::logging::{self, init_logging, parse_rotation, LogConfig, LOG_FILENAME};
use modelsync::reconcile::{reconcile, ReconcileReport};
use modelsync::refresh::{refresh_store, RefreshOptions};
use modelsync::store::ModelStore;
use modelsync::sync::{run_fleet_sync, SyncOptions};
use modelsync::transport::Transport;
use modelsync::utils::{format_display_path, MODEL_SUFFIXES};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};

/// Modelsync - tiered checksum ledgers for GPU-fleet model distribution
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable JSON log format (for log aggregation)
    #[arg(long, env = "MODELSYNC_LOG_JSON", default_value = "false", global = true)]
    log_json: bool,

    /// Log rotation period: daily, hourly, or never
    #[arg(long, env = "MODELSYNC_LOG_ROTATION", default_value = "daily", global = true)]
    log_rotation: String,

    /// Custom log directory (default: ~/.modelsync/logs)
    #[arg(long, env = "MODELSYNC_LOG_DIR", global = true)]
    log_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Refresh the ledger of a model store (local path or user@host:/path)
    Refresh {
        /// Store to refresh
        target: String,
        /// Fingerprint tiers to compute
        #[arg(short, long, value_enum, default_value = "l3")]
        level: LevelSelector,
        /// Recompute tiers that are already recorded
        #[arg(long)]
        force: bool,
        /// Report what would be done without computing or writing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Compare a candidate ledger against a source-of-truth ledger
    ///
    /// Prints the ordered synchronization set to stdout, one filename per
    /// line. Empty output with exit code 0 means nothing to do; exit code
    /// 1 means differences were found.
    Compare {
        /// Ledger being checked
        candidate: PathBuf,
        /// Ledger treated as the source of truth
        truth: PathBuf,
        /// Fingerprint tiers to compare
        #[arg(short, long, value_enum, default_value = "l3")]
        level: LevelSelector,
        /// Print the per-level breakdown with both compared values
        #[arg(short, long)]
        verbose: bool,
        /// Emit the reconciliation report as JSON on stdout
        #[arg(long)]
        json: bool,
    },
    /// Remove files a source-of-truth ledger does not attest
    Cleanup {
        /// Source-of-truth ledger
        truth: PathBuf,
        /// Store to clean up (local path or user@host:/path)
        target: String,
        /// Report what would be removed without removing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Synchronize every configured GPU server against the source of truth
    Sync {
        /// Fleet configuration file
        #[arg(short, long, env = "MODELSYNC_CONFIG", default_value = "fleet.toml")]
        config: PathBuf,
        /// Sync servers concurrently through the configured pool
        #[arg(long)]
        parallel: bool,
        /// Plan and report without downloading anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Verify that every fleet server holds the same number of model files
    Count {
        /// Fleet configuration file
        #[arg(short, long, env = "MODELSYNC_CONFIG", default_value = "fleet.toml")]
        config: PathBuf,
        /// Write the model list from the first reachable server to this file
        #[arg(long)]
        write_list: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Install color-eyre error hooks for colored error output
    color_eyre::install()?;

    let args = Args::parse();

    let log_dir = args.log_dir.clone().map(PathBuf::from).unwrap_or_else(|| {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".modelsync")
            .join("logs")
    });

    let log_file = log_dir.join(LOG_FILENAME);
    logging::set_log_file_path(log_file.to_string_lossy().to_string());

    let log_config = LogConfig {
        log_dir,
        json_format: args.log_json,
        rotation: parse_rotation(&args.log_rotation),
        ..Default::default()
    };

    if let Err(e) = init_logging(log_config) {
        eprintln!();
        eprintln!("Error: Failed to initialize logging: {e}");
        eprintln!();
        eprintln!("Logs: {}", format_display_path(&log_file.to_string_lossy()));
        eprintln!();
        return Err(e);
    }

    match args.command {
        Command::Refresh {
            target,
            level,
            force,
            dry_run,
        } => run_refresh(&target, level, force, dry_run).await,
        Command::Compare {
            candidate,
            truth,
            level,
            verbose,
            json,
        } => run_compare(&candidate, &truth, level, verbose, json).await,
        Command::Cleanup {
            truth,
            target,
            dry_run,
        } => run_cleanup(&truth, &target, dry_run).await,
        Command::Sync {
            config,
            parallel,
            dry_run,
        } => run_sync(&config, parallel, dry_run).await,
        Command::Count { config, write_list } => run_count(&config, write_list.as_deref()).await,
    }
}

async fn run_refresh(
    target: &str,
    level: LevelSelector,
    force: bool,
    dry_run: bool,
) -> Result<ExitCode> {
    let store = ModelStore::parse(target, Transport::default());
    if store.is_remote() {
        Transport::preflight()?;
    }

    let report = refresh_store(
        &store,
        RefreshOptions {
            selector: level,
            force,
            dry_run,
        },
    )
    .await?;

    if dry_run {
        info!(
            "Dry run: {} file(s) would be processed, {} already recorded",
            report.would_process.len(),
            report.skipped
        );
        for name in &report.would_process {
            println!("{name}");
        }
    } else {
        info!(
            "Computed {} file(s), skipped {}, purged {}",
            report.computed.len(),
            report.skipped,
            report.purged.len()
        );
        for purged in &report.purged {
            warn!("Purged {} (reason: {})", purged.filename, purged.reason);
        }
    }
    if !report.orphans.is_empty() {
        warn!(
            "{} orphan ledger entries left in place; run cleanup against a source of truth to drop them",
            report.orphans.len()
        );
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_compare(
    candidate_path: &Path,
    truth_path: &Path,
    level: LevelSelector,
    verbose: bool,
    json: bool,
) -> Result<ExitCode> {
    for path in [candidate_path, truth_path] {
        if !path.is_file() {
            error!("{} is not a file", path.display());
            return Ok(ExitCode::from(2));
        }
    }

    let candidate = load_ledger(candidate_path).await;
    let truth = load_ledger(truth_path).await;
    let report = reconcile(&candidate, &truth, level);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if verbose {
        print_verbose_report(&report, &candidate, &truth);
    } else {
        for name in report.sync_set() {
            println!("{name}");
        }
    }

    Ok(if report.has_differences() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn print_verbose_report(report: &ReconcileReport, candidate: &Ledger, truth: &Ledger) {
    for level in &report.levels {
        println!("=== {} ===", level.level);
        for name in &level.to_fetch {
            println!(
                "  fetch       {name}: (not computed) vs {}",
                value_at(truth, name, level.level)
            );
        }
        for mismatch in &level.mismatched {
            println!(
                "  mismatch    {}: {} vs {}",
                mismatch.filename, mismatch.candidate, mismatch.truth
            );
        }
        for name in &level.extraneous {
            println!(
                "  extraneous  {name}: {} vs (not computed)",
                value_at(candidate, name, level.level)
            );
        }
        println!(
            "  unchanged: {}, empty on both sides: {}",
            level.unchanged.len(),
            level.both_empty.len()
        );
    }
}

fn value_at(ledger: &Ledger, name: &str, level: Level) -> String {
    ledger
        .get(name)
        .and_then(|entry| entry.level(level))
        .map_or_else(|| "(not computed)".to_string(), ToString::to_string)
}

async fn run_cleanup(truth_path: &Path, target: &str, dry_run: bool) -> Result<ExitCode> {
    if !truth_path.is_file() {
        error!("{} is not a file", truth_path.display());
        return Ok(ExitCode::from(2));
    }
    let truth = load_ledger(truth_path).await;
    let attested: BTreeSet<String> = truth.filenames().into_iter().collect();
    info!("Source of truth attests {} file(s)", attested.len());

    let store = ModelStore::parse(target, Transport::default());
    if store.is_remote() {
        Transport::preflight()?;
    }

    let report = cleanup_store(&store, &attested, CleanupOptions { dry_run }).await?;
    for name in &report.extraneous {
        println!("{name}");
    }
    info!(
        "{}{} extraneous file(s), {} ledger entries dropped, {} kept",
        if dry_run { "Dry run: " } else { "" },
        report.extraneous.len(),
        report.dropped_entries.len(),
        report.kept
    );
    Ok(ExitCode::SUCCESS)
}

async fn run_sync(config_path: &Path, parallel: bool, dry_run: bool) -> Result<ExitCode> {
    let config = load_config(config_path)?;
    Transport::preflight()?;

    let outcome = run_fleet_sync(&config, SyncOptions { dry_run, parallel }).await?;

    for server in &outcome.outcomes {
        if server.success {
            info!(
                "{}: OK ({}/{} files)",
                server.server, server.downloaded, server.planned
            );
        } else {
            error!(
                "{}: FAILED ({} verification failure(s), {} transfer failure(s))",
                server.server,
                server.verification_failures.len(),
                server.transfer_failures.len()
            );
        }
    }
    let elapsed = chrono::Utc::now() - outcome.started_at;
    info!(
        "Fleet sync {} finished in {}s",
        outcome.run_id,
        elapsed.num_seconds()
    );

    if outcome.all_succeeded() {
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!();
        eprintln!("Some servers failed to sync. Logs: {}", logging::get_log_file_path());
        eprintln!();
        Ok(ExitCode::FAILURE)
    }
}

async fn run_count(config_path: &Path, write_list: Option<&Path>) -> Result<ExitCode> {
    let config = load_config(config_path)?;
    Transport::preflight()?;

    let report = verify_counts(&config).await?;

    for server in &report.servers {
        let counts: Vec<String> = server
            .counts
            .iter()
            .map(|(suffix, count)| format!("{suffix}: {count}"))
            .collect();
        info!("{}: {}", server.server, counts.join(", "));
    }
    for (server, reason) in &report.errors {
        warn!("{server}: {reason}");
    }

    if report.consistent {
        info!("All {} reachable server(s) agree", report.servers.len());
    } else {
        for suffix in MODEL_SUFFIXES {
            let groups = group_by_count(&report.servers, suffix);
            if groups.len() > 1 {
                error!("{suffix} counts disagree:");
                for (count, servers) in groups {
                    error!("  {count}: {}", servers.join(", "));
                }
            }
        }
    }

    if let Some(dest) = write_list {
        if report.consistent && report.errors.is_empty() {
            let written = export_model_list(&config, dest).await?;
            info!("Wrote {written} model name(s) to {}", dest.display());
        } else {
            warn!("Skipping model list export: fleet is inconsistent or had errors");
        }
    }

    Ok(if report.consistent && report.errors.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
