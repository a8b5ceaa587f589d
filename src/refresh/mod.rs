//! Ledger refresh with the corruption policy applied.
//!
//! A pass computes the missing fingerprints for every listed file at the
//! requested tiers, records sentinels for zero-size and unreadable files,
//! persists the ledger after every file, and finishes by purging every
//! condemned file from both the store and the ledger. Orphan ledger rows
//! (file gone from the store) are reported but left in place; only the
//! explicit cleanup sweep drops them.

use crate::fingerprint::{Level, LevelSelector};
use crate::ledger::{self, Fingerprint, Ledger, LedgerError};
use crate::store::{ModelStore, StoreError};
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum RefreshError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Options for one refresh pass.
#[derive(Debug, Clone, Copy)]
pub struct RefreshOptions {
    /// Which tiers to compute.
    pub selector: LevelSelector,
    /// Recompute the selected tiers even when already recorded.
    pub force: bool,
    /// Report what a real pass would do without computing or writing.
    pub dry_run: bool,
}

/// A file condemned by the corruption policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgedFile {
    pub filename: String,
    /// The sentinel that condemned it.
    pub reason: Fingerprint,
}

/// Summary of one refresh pass.
#[derive(Debug, Default)]
pub struct RefreshReport {
    /// Files whose fingerprints were computed this pass.
    pub computed: Vec<String>,
    /// Files skipped because every requested tier was already recorded.
    pub skipped: usize,
    /// Ledger rows whose file no longer exists in the store.
    pub orphans: Vec<String>,
    /// Files removed from the store and dropped from the ledger.
    pub purged: Vec<PurgedFile>,
    /// Dry run only: files a real pass would process.
    pub would_process: Vec<String>,
}

/// Run one refresh pass over `store`.
///
/// Running the same pass twice without filesystem changes is a no-op the
/// second time: every value is already recorded, nothing is recomputed and
/// the ledger bytes stay identical.
pub async fn refresh_store(
    store: &ModelStore,
    options: RefreshOptions,
) -> Result<RefreshReport, RefreshError> {
    let ledger_path = store.ledger_path();
    store.pull_ledger().await?;
    let mut ledger = ledger::load_ledger(&ledger_path).await;
    let files = store.list_files().await?;
    info!(
        "{}: {} ledger entries, {} files in store",
        store.describe(),
        ledger.len(),
        files.len()
    );

    let mut report = RefreshReport::default();

    let on_disk: BTreeSet<&str> = files.iter().map(String::as_str).collect();
    for name in ledger.filenames() {
        if !on_disk.contains(name.as_str()) {
            warn!("Orphan ledger entry (file missing from store): {name}");
            report.orphans.push(name);
        }
    }

    let inserted = ledger.merge(&files);
    if inserted > 0 {
        debug!("Added {inserted} blank ledger entries");
    }
    if !options.dry_run {
        // The full listing is on record before any hashing starts, so an
        // interrupted pass can resume from the ledger alone.
        ledger::save_ledger(&ledger, &ledger_path).await?;
    }

    let mut marked: Vec<PurgedFile> = Vec::new();

    for name in &files {
        let Some(entry) = ledger.get(name) else {
            continue;
        };

        let pending: Vec<Level> = options
            .selector
            .levels()
            .iter()
            .copied()
            .filter(|level| options.force || entry.level(*level).is_none())
            .collect();

        // A sentinel recorded at a requested tier re-condemns the file: a
        // pass interrupted between persisting the sentinel and purging
        // heals on the next run. Force mode recomputes from scratch
        // instead, in case the file was replaced.
        let sentinel = if options.force {
            None
        } else {
            options
                .selector
                .levels()
                .iter()
                .find_map(|level| entry.level(*level).filter(|f| f.is_sentinel()).cloned())
        };

        if options.dry_run {
            if sentinel.is_some() || !pending.is_empty() {
                report.would_process.push(name.clone());
            } else {
                report.skipped += 1;
            }
            continue;
        }

        if let Some(reason) = sentinel {
            warn!("{name}: previously recorded {reason}, scheduling removal");
            marked.push(PurgedFile {
                filename: name.clone(),
                reason,
            });
            continue;
        }

        if pending.is_empty() {
            debug!("Skipping {name} (already recorded)");
            report.skipped += 1;
            continue;
        }

        // Size is probed first whatever the requested tiers: zero-size and
        // unreadable files must be caught before any hashing is attempted.
        let size = match store.file_size(name).await {
            Ok(size) => size,
            Err(e) => {
                warn!("{name}: size probe failed: {e}");
                record_sentinel(&mut ledger, name, &pending, &Fingerprint::Error);
                marked.push(PurgedFile {
                    filename: name.clone(),
                    reason: Fingerprint::Error,
                });
                ledger::save_ledger(&ledger, &ledger_path).await?;
                continue;
            }
        };
        if size == 0 {
            warn!("{name}: zero-size file, scheduling removal");
            record_sentinel(&mut ledger, name, &pending, &Fingerprint::ZeroSize);
            marked.push(PurgedFile {
                filename: name.clone(),
                reason: Fingerprint::ZeroSize,
            });
            ledger::save_ledger(&ledger, &ledger_path).await?;
            continue;
        }

        info!("Fingerprinting {name} ({})", crate::utils::format_size(size));
        let mut failed = false;
        for level in &pending {
            let computed = match level {
                Level::Size => Ok(size.to_string()),
                Level::Quick => store.quick_digest(name, size).await,
                Level::Full => store.full_digest(name).await,
            };
            match computed {
                Ok(value) => {
                    debug!("{name} {level} -> {value}");
                    set_value(&mut ledger, name, *level, Fingerprint::Value(value));
                }
                Err(e) => {
                    warn!("{name}: {level} fingerprint failed: {e}");
                    set_value(&mut ledger, name, *level, Fingerprint::Error);
                    marked.push(PurgedFile {
                        filename: name.clone(),
                        reason: Fingerprint::Error,
                    });
                    failed = true;
                    break;
                }
            }
        }
        // One file at a time: a crash loses at most the in-flight file.
        ledger::save_ledger(&ledger, &ledger_path).await?;
        if !failed {
            report.computed.push(name.clone());
        }
    }

    if !options.dry_run && !marked.is_empty() {
        let names: Vec<String> = marked.iter().map(|p| p.filename.clone()).collect();
        info!("Purging {} corrupted or zero-size file(s)", names.len());
        let removed = store.remove_files(&names).await?;
        debug!("Removed {removed} file(s) from the store");
        for name in &names {
            ledger.remove(name);
        }
        ledger::save_ledger(&ledger, &ledger_path).await?;
        report.purged = marked;
    }

    if !options.dry_run {
        store.push_ledger().await?;
    }

    Ok(report)
}

fn set_value(ledger: &mut Ledger, name: &str, level: Level, value: Fingerprint) {
    if let Some(entry) = ledger.get_mut(name) {
        entry.set_level(level, Some(value));
    }
}

fn record_sentinel(ledger: &mut Ledger, name: &str, levels: &[Level], sentinel: &Fingerprint) {
    for level in levels {
        set_value(ledger, name, *level, sentinel.clone());
    }
}
