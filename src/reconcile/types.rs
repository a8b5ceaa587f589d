use crate::fingerprint::Level;
use serde::Serialize;
use std::collections::BTreeSet;

/// Five-way classification of one filename at one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Classification {
    /// Neither ledger has a value at this level.
    BothEmpty,
    /// The source of truth has a value; the candidate does not.
    ToFetch,
    /// The candidate has a value the source of truth does not attest.
    Extraneous,
    /// Both have the same real value.
    Unchanged,
    /// Both have values and they differ (sentinels always differ).
    Mismatched,
}

/// A filename whose values differ between the two ledgers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Mismatch {
    pub filename: String,
    /// Recorded value on the candidate side, sentinels included.
    pub candidate: String,
    /// Recorded value on the source-of-truth side.
    pub truth: String,
}

/// Classification of every filename at one level.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelReport {
    pub level: Level,
    pub to_fetch: Vec<String>,
    pub mismatched: Vec<Mismatch>,
    pub extraneous: Vec<String>,
    pub unchanged: Vec<String>,
    pub both_empty: Vec<String>,
}

impl LevelReport {
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self {
            level,
            to_fetch: Vec::new(),
            mismatched: Vec::new(),
            extraneous: Vec::new(),
            unchanged: Vec::new(),
            both_empty: Vec::new(),
        }
    }

    /// Files a caller must fetch to match the source of truth at this
    /// level, in ascending filename order. This ordered list is the
    /// externally consumed contract.
    #[must_use]
    pub fn sync_set(&self) -> Vec<String> {
        let mut set: BTreeSet<String> = self.to_fetch.iter().cloned().collect();
        set.extend(self.mismatched.iter().map(|m| m.filename.clone()));
        set.into_iter().collect()
    }

    /// Whether anything differs between the two ledgers at this level.
    /// Extraneous files count: they are reported, never auto-deleted.
    #[must_use]
    pub fn has_differences(&self) -> bool {
        !self.to_fetch.is_empty() || !self.mismatched.is_empty() || !self.extraneous.is_empty()
    }
}

/// Reconciliation across one or more levels.
///
/// Each level keeps its own breakdown: a file can mismatch only at L3
/// while agreeing at L1, and that distinction must stay visible.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub levels: Vec<LevelReport>,
}

impl ReconcileReport {
    /// Union of every level's sync set, deduplicated, ascending.
    #[must_use]
    pub fn sync_set(&self) -> Vec<String> {
        let mut set = BTreeSet::new();
        for level in &self.levels {
            set.extend(level.sync_set());
        }
        set.into_iter().collect()
    }

    #[must_use]
    pub fn has_differences(&self) -> bool {
        self.levels.iter().any(LevelReport::has_differences)
    }
}
