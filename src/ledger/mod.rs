//! CSV-persisted integrity ledger.
//!
//! On disk a ledger is a table with the fixed header
//! `filename,sha256sum,8k_sha256sum,filesize`, one row per file, sorted by
//! filename so rewrites diff cleanly under version control. Empty fields
//! mean "not computed"; the `Error` / `ZeroSize` sentinels record detected
//! failures.

mod types;

pub use types::{Fingerprint, Ledger, LedgerEntry};

use crate::utils::atomic_write;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Failed to encode ledger row: {0}")]
    Encode(#[from] csv::Error),

    #[error("Failed to write ledger {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// One CSV row in its on-disk shape. Field order fixes the column order.
#[derive(Debug, Serialize, Deserialize)]
struct RawRow {
    filename: String,
    #[serde(default)]
    sha256sum: String,
    #[serde(rename = "8k_sha256sum", default)]
    quick_sha256sum: String,
    #[serde(default)]
    filesize: String,
}

/// Load a ledger from `path`.
///
/// A missing, unreadable, or unparseable file yields an empty ledger so
/// first-run bootstrapping and recovery never fail; the problem is logged
/// instead. Header names are matched with surrounding whitespace trimmed,
/// unknown columns are ignored, and missing columns read as "not computed".
pub async fn load_ledger(path: &Path) -> Ledger {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ledger::new(),
        Err(e) => {
            warn!(
                "Could not read ledger {}: {e}; treating as empty",
                path.display()
            );
            return Ledger::new();
        }
    };
    parse_ledger(&content, path)
}

fn parse_ledger(content: &str, path: &Path) -> Ledger {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut ledger = Ledger::new();
    for row in reader.deserialize::<RawRow>() {
        match row {
            Ok(row) => {
                if row.filename.is_empty() {
                    continue;
                }
                // Ledger keys are basenames; a path here is corruption.
                if row.filename.contains('/') {
                    warn!(
                        "Skipping non-basename row {:?} in {}",
                        row.filename,
                        path.display()
                    );
                    continue;
                }
                let entry = LedgerEntry {
                    full_hash: Fingerprint::from_field(&row.sha256sum),
                    quick_hash: Fingerprint::from_field(&row.quick_sha256sum),
                    size: Fingerprint::from_field(&row.filesize),
                };
                ledger.insert(row.filename, entry);
            }
            Err(e) => warn!("Skipping malformed row in {}: {e}", path.display()),
        }
    }
    ledger
}

/// Persist a ledger to `path`.
///
/// Writes the full table, blank rows included, in the canonical column
/// order, then replaces the previous file in one rename so an interrupted
/// write never leaves a half-written ledger behind.
pub async fn save_ledger(ledger: &Ledger, path: &Path) -> Result<(), LedgerError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for (filename, entry) in ledger.iter() {
        writer.serialize(RawRow {
            filename: filename.clone(),
            sha256sum: field(entry.full_hash.as_ref()),
            quick_sha256sum: field(entry.quick_hash.as_ref()),
            filesize: field(entry.size.as_ref()),
        })?;
    }
    let bytes = writer.into_inner().map_err(|e| LedgerError::Write {
        path: path.display().to_string(),
        source: std::io::Error::other(e.to_string()),
    })?;
    atomic_write(path, &bytes)
        .await
        .map_err(|e| LedgerError::Write {
            path: path.display().to_string(),
            source: e,
        })
}

fn field(value: Option<&Fingerprint>) -> String {
    value.map(ToString::to_string).unwrap_or_default()
}
