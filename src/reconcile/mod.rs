//! Reconciliation of a candidate ledger against a source of truth.
//!
//! For a chosen level, every filename appearing in either ledger lands in
//! exactly one of five buckets. The ordered `toFetch` plus `mismatched`
//! union is what a caller downloads; `extraneous` files are reported but
//! never deleted by this engine.

mod types;

pub use types::{Classification, LevelReport, Mismatch, ReconcileReport};

use crate::fingerprint::{Level, LevelSelector};
use crate::ledger::{Fingerprint, Ledger};
use std::collections::BTreeSet;

/// Classify one filename's values at one level.
///
/// Absent means "no value recorded"; sentinels are values and therefore
/// reach the equality check, where they never match anything.
#[must_use]
pub fn classify(candidate: Option<&Fingerprint>, truth: Option<&Fingerprint>) -> Classification {
    match (candidate, truth) {
        (None, None) => Classification::BothEmpty,
        (None, Some(_)) => Classification::ToFetch,
        (Some(_), None) => Classification::Extraneous,
        (Some(c), Some(t)) if c.matches(t) => Classification::Unchanged,
        (Some(_), Some(_)) => Classification::Mismatched,
    }
}

/// Classify every filename from either ledger at one level.
#[must_use]
pub fn reconcile_level(candidate: &Ledger, truth: &Ledger, level: Level) -> LevelReport {
    let mut names: BTreeSet<&str> = candidate.iter().map(|(name, _)| name.as_str()).collect();
    names.extend(truth.iter().map(|(name, _)| name.as_str()));

    let mut report = LevelReport::new(level);
    for name in names {
        let candidate_value = candidate.get(name).and_then(|e| e.level(level));
        let truth_value = truth.get(name).and_then(|e| e.level(level));
        match classify(candidate_value, truth_value) {
            Classification::BothEmpty => report.both_empty.push(name.to_string()),
            Classification::ToFetch => report.to_fetch.push(name.to_string()),
            Classification::Extraneous => report.extraneous.push(name.to_string()),
            Classification::Unchanged => report.unchanged.push(name.to_string()),
            Classification::Mismatched => report.mismatched.push(Mismatch {
                filename: name.to_string(),
                candidate: candidate_value.map(ToString::to_string).unwrap_or_default(),
                truth: truth_value.map(ToString::to_string).unwrap_or_default(),
            }),
        }
    }
    report
}

/// Reconcile at every level the selector covers.
#[must_use]
pub fn reconcile(candidate: &Ledger, truth: &Ledger, selector: LevelSelector) -> ReconcileReport {
    ReconcileReport {
        levels: selector
            .levels()
            .iter()
            .map(|level| reconcile_level(candidate, truth, *level))
            .collect(),
    }
}

#[cfg(test)]
#[path = "reconcile_tests.rs"]
mod reconcile_tests;
