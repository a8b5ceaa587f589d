//! Fleet synchronization against the source-of-truth endpoint.
//!
//! For each configured GPU server: refresh its ledger (which also clears
//! corrupt files), reconcile against the source of truth, download the
//! synchronization set onto the server, verify every download with fresh
//! fingerprints, and push the updated ledger back. Servers run
//! sequentially by default or through a bounded worker pool.

mod progress;

pub use progress::{spawn_progress_logger, ProgressEvent, ProgressSender, SyncPhase};

use crate::config::FleetConfig;
use crate::fingerprint::{Level, LevelSelector};
use crate::ledger::{self, Fingerprint, Ledger, LedgerEntry};
use crate::reconcile;
use crate::refresh::{refresh_store, RefreshOptions};
use crate::store::{ModelStore, RemoteSpec, StoreError};
use crate::transport::{download_command, Transport};
use crate::utils::LEDGER_FILENAME;
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Local cache of the source-of-truth ledger.
const TRUTH_LEDGER_CACHE: &str = "nas-sha256-list.csv";

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error("Source of truth is unreachable at {url}: {reason}")]
    SourceUnreachable { url: String, reason: String },

    #[error("Failed to fetch source-of-truth ledger from {url}: {reason}")]
    FetchTruth { url: String, reason: String },

    #[error(transparent)]
    Refresh(#[from] crate::refresh::RefreshError),

    #[error(transparent)]
    Ledger(#[from] crate::ledger::LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid server spec {0:?} (expected user@host)")]
    BadServer(String),
}

/// Options for one fleet sync run.
#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    /// Plan and report without downloading or mutating anything.
    pub dry_run: bool,
    /// Run servers through the configured worker pool instead of one at a
    /// time.
    pub parallel: bool,
}

/// What happened on one server.
#[derive(Debug, Clone)]
pub struct ServerOutcome {
    pub server: String,
    /// Size of the synchronization set.
    pub planned: usize,
    pub downloaded: usize,
    /// Files that still mismatched after the retry budget.
    pub verification_failures: Vec<String>,
    /// Files whose transfer failed outright.
    pub transfer_failures: Vec<String>,
    pub success: bool,
}

impl ServerOutcome {
    fn new(server: String) -> Self {
        Self {
            server,
            planned: 0,
            downloaded: 0,
            verification_failures: Vec::new(),
            transfer_failures: Vec::new(),
            success: false,
        }
    }
}

/// Outcome of a whole fleet sync run.
#[derive(Debug)]
pub struct FleetOutcome {
    pub run_id: Uuid,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub outcomes: Vec<ServerOutcome>,
}

impl FleetOutcome {
    /// True when every server completed without failures.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|outcome| outcome.success)
    }
}

struct ServerContext {
    server: String,
    models_path: String,
    http_url: String,
    truth: Ledger,
    transport: Transport,
    level: LevelSelector,
    attempts: u32,
    halt_on_failure: bool,
    dry_run: bool,
    progress: ProgressSender,
}

impl ServerContext {
    fn report(&self, phase: SyncPhase, files_done: usize, files_total: usize) {
        let event = ProgressEvent {
            server: self.server.clone(),
            phase,
            files_done,
            files_total,
        };
        // Progress is best-effort; the logger may already be gone.
        let _unused = self.progress.send(event);
    }
}

/// Synchronize every configured GPU server against the source of truth.
pub async fn run_fleet_sync(
    config: &FleetConfig,
    options: SyncOptions,
) -> Result<FleetOutcome, SyncError> {
    let run_id = Uuid::new_v4();
    let started_at = chrono::Utc::now();
    let source = config.source()?;
    let servers = config.resolve_servers()?;
    let transport = config.transport();

    info!(%run_id, "Starting fleet sync of {} server(s)", servers.len());
    if options.dry_run {
        info!("Dry run: nothing will be downloaded or deleted");
    }

    check_source_reachable(&source.http_url).await?;
    let truth_path = fetch_truth_ledger(&source.http_url).await?;
    let truth = ledger::load_ledger(&truth_path).await;
    info!("Source of truth lists {} file(s)", truth.len());

    let (progress, logger) = spawn_progress_logger();

    let pool = if options.parallel {
        config.sync.max_parallel.max(1)
    } else {
        1
    };

    let outcomes: Vec<ServerOutcome> = stream::iter(servers)
        .map(|server| {
            let context = ServerContext {
                server: server.clone(),
                models_path: config.fleet.models_path.clone(),
                http_url: source.http_url.clone(),
                truth: truth.clone(),
                transport: transport.clone(),
                level: config.sync.level,
                attempts: config.transport.attempts,
                halt_on_failure: config.sync.halt_on_verification_failure,
                dry_run: options.dry_run,
                progress: progress.clone(),
            };
            let span = info_span!("server_sync", server = %server, %run_id);
            async move { sync_server(context).await }.instrument(span)
        })
        .buffer_unordered(pool)
        .collect()
        .await;

    drop(progress);
    if let Err(e) = logger.await {
        warn!("Progress logger ended abnormally: {e}");
    }

    Ok(FleetOutcome {
        run_id,
        started_at,
        outcomes,
    })
}

async fn sync_server(context: ServerContext) -> ServerOutcome {
    let mut outcome = ServerOutcome::new(context.server.clone());
    if let Err(e) = sync_server_inner(&context, &mut outcome).await {
        error!("Sync failed for {}: {e}", context.server);
        context.report(SyncPhase::Failed, outcome.downloaded, outcome.planned);
        outcome.success = false;
    }
    outcome
}

async fn sync_server_inner(
    context: &ServerContext,
    outcome: &mut ServerOutcome,
) -> Result<(), SyncError> {
    let spec = RemoteSpec::parse(&format!("{}:{}", context.server, context.models_path))
        .ok_or_else(|| SyncError::BadServer(context.server.clone()))?;
    let store = ModelStore::Remote {
        spec: spec.clone(),
        transport: context.transport.clone(),
    };

    // Step 1: refresh the server ledger; corrupt files are purged here.
    context.report(SyncPhase::Refreshing, 0, 0);
    refresh_store(
        &store,
        RefreshOptions {
            selector: context.level,
            force: false,
            dry_run: context.dry_run,
        },
    )
    .await?;

    // Step 2: reconcile against the source of truth.
    context.report(SyncPhase::Comparing, 0, 0);
    let candidate = ledger::load_ledger(&store.ledger_path()).await;
    let report = reconcile::reconcile(&candidate, &context.truth, context.level);
    let plan = report.sync_set();
    outcome.planned = plan.len();

    if plan.is_empty() {
        info!("{} already in sync", context.server);
        context.report(SyncPhase::Done, 0, 0);
        outcome.success = true;
        return Ok(());
    }
    info!("{}: {} file(s) to download", context.server, plan.len());

    if context.dry_run {
        for name in &plan {
            info!("Would download {name}");
        }
        context.report(SyncPhase::Done, 0, plan.len());
        outcome.success = true;
        return Ok(());
    }

    // Step 3: download and verify each file, updating the ledger as we go.
    let mut server_ledger = candidate;
    let total = plan.len();
    for (index, name) in plan.iter().enumerate() {
        context.report(SyncPhase::Downloading, index, total);
        match download_and_verify(context, &store, &spec, &mut server_ledger, name).await {
            Ok(()) => {
                outcome.downloaded += 1;
                ledger::save_ledger(&server_ledger, &store.ledger_path()).await?;
            }
            Err(FileFailure::Verification) => {
                // The recomputed values stay in the ledger: they describe
                // what is actually on disk, and the next compare flags it.
                outcome.verification_failures.push(name.clone());
                ledger::save_ledger(&server_ledger, &store.ledger_path()).await?;
                if context.halt_on_failure {
                    warn!("Halting {} after verification failure on {name}", context.server);
                    break;
                }
            }
            Err(FileFailure::Transfer(e)) => {
                warn!("{name}: transfer failed: {e}");
                outcome.transfer_failures.push(name.clone());
            }
        }
    }

    // Step 4: push the updated ledger back to the server.
    context.report(SyncPhase::Verifying, outcome.downloaded, total);
    store.push_ledger().await?;

    outcome.success =
        outcome.verification_failures.is_empty() && outcome.transfer_failures.is_empty();
    context.report(
        if outcome.success {
            SyncPhase::Done
        } else {
            SyncPhase::Failed
        },
        outcome.downloaded,
        total,
    );
    Ok(())
}

enum FileFailure {
    Transfer(StoreError),
    Verification,
}

/// Download one file onto the server, recompute its fingerprints, and
/// check them against the source of truth. Two attempts by default, with
/// a fresh download and recomputation between them to rule out a one-off
/// read glitch.
async fn download_and_verify(
    context: &ServerContext,
    store: &ModelStore,
    spec: &RemoteSpec,
    server_ledger: &mut Ledger,
    name: &str,
) -> Result<(), FileFailure> {
    let url = format!("{}/{name}", context.http_url.trim_end_matches('/'));
    let dest = spec.file_path(name);
    let attempts = context.attempts.max(1);

    for attempt in 1..=attempts {
        if attempt > 1 {
            info!("{name}: attempt {attempt}/{attempts}");
        }
        if let Err(e) = context
            .transport
            .ssh_download(&context.server, &download_command(&url, &dest))
            .await
        {
            if attempt == attempts {
                return Err(FileFailure::Transfer(e.into()));
            }
            warn!("{name}: download failed ({e}); retrying");
            continue;
        }

        match recompute_entry(store, name, context.level).await {
            Ok(entry) => {
                let verified =
                    verify_against_truth(&entry, context.truth.get(name), context.level.levels());
                server_ledger.insert(name.to_string(), entry);
                if verified {
                    return Ok(());
                }
                warn!("{name}: fingerprint mismatch after download (attempt {attempt}/{attempts})");
            }
            Err(e) => {
                warn!("{name}: could not fingerprint after download: {e}");
                if attempt == attempts {
                    return Err(FileFailure::Transfer(e));
                }
            }
        }
    }
    Err(FileFailure::Verification)
}

async fn recompute_entry(
    store: &ModelStore,
    name: &str,
    selector: LevelSelector,
) -> Result<LedgerEntry, StoreError> {
    let size = store.file_size(name).await?;
    let mut entry = LedgerEntry::default();
    for level in selector.levels() {
        let value = match level {
            Level::Size => size.to_string(),
            Level::Quick => store.quick_digest(name, size).await?,
            Level::Full => store.full_digest(name).await?,
        };
        entry.set_level(*level, Some(Fingerprint::Value(value)));
    }
    Ok(entry)
}

/// A download verifies when every selected tier the source of truth
/// attests matches the freshly computed value. A sentinel on the truth
/// side can never match, so such files keep failing until the source of
/// truth itself is repaired.
fn verify_against_truth(
    entry: &LedgerEntry,
    truth: Option<&LedgerEntry>,
    levels: &[Level],
) -> bool {
    let Some(truth) = truth else {
        return true;
    };
    levels.iter().all(|level| match truth.level(*level) {
        Some(expected) => entry
            .level(*level)
            .is_some_and(|actual| actual.matches(expected)),
        None => true,
    })
}

async fn check_source_reachable(base_url: &str) -> Result<(), SyncError> {
    let url = format!("{}/{LEDGER_FILENAME}", base_url.trim_end_matches('/'));
    let probe_url = url.clone();
    let result = tokio::task::spawn_blocking(move || {
        ureq::head(&probe_url)
            .timeout(Duration::from_secs(10))
            .call()
            .map(|_| ())
            .map_err(|e| e.to_string())
    })
    .await;
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(reason)) => Err(SyncError::SourceUnreachable { url, reason }),
        Err(join) => Err(SyncError::SourceUnreachable {
            url,
            reason: join.to_string(),
        }),
    }
}

/// Download the source-of-truth ledger into the local cache file and
/// return its path.
async fn fetch_truth_ledger(base_url: &str) -> Result<PathBuf, SyncError> {
    let url = format!("{}/{LEDGER_FILENAME}", base_url.trim_end_matches('/'));
    let fetch_url = url.clone();
    let body = tokio::task::spawn_blocking(move || {
        ureq::get(&fetch_url)
            .timeout(Duration::from_secs(30))
            .call()
            .map_err(|e| e.to_string())
            .and_then(|response| response.into_string().map_err(|e| e.to_string()))
    })
    .await
    .map_err(|e| SyncError::FetchTruth {
        url: url.clone(),
        reason: e.to_string(),
    })?
    .map_err(|reason| SyncError::FetchTruth {
        url: url.clone(),
        reason,
    })?;

    let path = PathBuf::from(TRUTH_LEDGER_CACHE);
    crate::utils::atomic_write(&path, body.as_bytes())
        .await
        .map_err(|e| SyncError::FetchTruth {
            url,
            reason: e.to_string(),
        })?;
    Ok(path)
}
