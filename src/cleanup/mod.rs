//! Removal of files not attested by a source of truth.
//!
//! This is the only place ledger rows are dropped without the file having
//! failed fingerprinting: a plain refresh reports orphans and extraneous
//! files but never deletes them. The sweep runs the same classification
//! in dry-run mode and withholds only the mutations.

use crate::ledger::{self, LedgerError};
use crate::store::{ModelStore, StoreError};
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum CleanupError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Options for a cleanup sweep.
#[derive(Debug, Clone, Copy)]
pub struct CleanupOptions {
    pub dry_run: bool,
}

/// Summary of one cleanup sweep.
#[derive(Debug, Default)]
pub struct CleanupReport {
    /// Files present in the store but absent from the source of truth,
    /// ascending. In a real run these were removed (or attempted).
    pub extraneous: Vec<String>,
    /// Ledger rows dropped: extraneous files and orphan entries alike.
    pub dropped_entries: Vec<String>,
    /// Files actually removed from the store.
    pub removed: usize,
    /// Files kept because the source of truth attests them.
    pub kept: usize,
}

/// Remove from `store` every file and ledger row absent from `truth`.
pub async fn cleanup_store(
    store: &ModelStore,
    truth: &BTreeSet<String>,
    options: CleanupOptions,
) -> Result<CleanupReport, CleanupError> {
    store.pull_ledger().await?;
    let ledger_path = store.ledger_path();
    let mut ledger = ledger::load_ledger(&ledger_path).await;
    let files = store.list_files().await?;

    let mut report = CleanupReport::default();
    for name in &files {
        if truth.contains(name) {
            report.kept += 1;
        } else {
            report.extraneous.push(name.clone());
        }
    }
    for name in ledger.filenames() {
        if !truth.contains(&name) {
            report.dropped_entries.push(name);
        }
    }

    if options.dry_run {
        info!(
            "Dry run: would remove {} file(s) and {} ledger entries from {}",
            report.extraneous.len(),
            report.dropped_entries.len(),
            store.describe()
        );
        return Ok(report);
    }

    if !report.extraneous.is_empty() {
        report.removed = store.remove_files(&report.extraneous).await?;
        info!(
            "Removed {} of {} extraneous file(s)",
            report.removed,
            report.extraneous.len()
        );
    }
    if !report.dropped_entries.is_empty() {
        for name in &report.dropped_entries {
            ledger.remove(name);
        }
        ledger::save_ledger(&ledger, &ledger_path).await?;
        store.push_ledger().await?;
        info!("Dropped {} ledger entries", report.dropped_entries.len());
    }
    Ok(report)
}
