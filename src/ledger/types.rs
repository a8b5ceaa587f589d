use crate::fingerprint::{Level, ERROR_SENTINEL, ZERO_SIZE_SENTINEL};
use std::collections::BTreeMap;
use std::fmt;

/// A recorded integrity value: a real fingerprint or a failure sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fingerprint {
    /// A real fingerprint: a decimal size or a lowercase hex digest.
    Value(String),
    /// The file could not be read when this tier was computed.
    Error,
    /// The file had zero bytes when this tier was computed.
    ZeroSize,
}

impl Fingerprint {
    /// Parse a CSV field. An empty field means "not yet computed".
    #[must_use]
    pub fn from_field(raw: &str) -> Option<Fingerprint> {
        match raw.trim() {
            "" => None,
            ERROR_SENTINEL => Some(Fingerprint::Error),
            ZERO_SIZE_SENTINEL => Some(Fingerprint::ZeroSize),
            value => Some(Fingerprint::Value(value.to_string())),
        }
    }

    /// Whether this is one of the failure sentinels.
    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        matches!(self, Fingerprint::Error | Fingerprint::ZeroSize)
    }

    /// Whether two recorded values attest the same content.
    ///
    /// Sentinels never match anything, including an identical sentinel on
    /// the other side: two files that both failed to read are not known to
    /// be equal.
    #[must_use]
    pub fn matches(&self, other: &Fingerprint) -> bool {
        match (self, other) {
            (Fingerprint::Value(a), Fingerprint::Value(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fingerprint::Value(value) => f.write_str(value),
            Fingerprint::Error => f.write_str(ERROR_SENTINEL),
            Fingerprint::ZeroSize => f.write_str(ZERO_SIZE_SENTINEL),
        }
    }
}

/// One ledger row. `None` means the tier has not been computed yet, which
/// is distinct from a recorded sentinel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerEntry {
    /// Level 3: digest of the entire content.
    pub full_hash: Option<Fingerprint>,
    /// Level 2: digest of the first and last 4096 bytes.
    pub quick_hash: Option<Fingerprint>,
    /// Level 1: byte size.
    pub size: Option<Fingerprint>,
}

impl LedgerEntry {
    /// The recorded value at one tier.
    #[must_use]
    pub fn level(&self, level: Level) -> Option<&Fingerprint> {
        match level {
            Level::Size => self.size.as_ref(),
            Level::Quick => self.quick_hash.as_ref(),
            Level::Full => self.full_hash.as_ref(),
        }
    }

    /// Replace the recorded value at one tier.
    pub fn set_level(&mut self, level: Level, value: Option<Fingerprint>) {
        match level {
            Level::Size => self.size = value,
            Level::Quick => self.quick_hash = value,
            Level::Full => self.full_hash = value,
        }
    }

    /// Whether no tier has been computed.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.full_hash.is_none() && self.quick_hash.is_none() && self.size.is_none()
    }
}

/// An ordered map of filename to entry for one model store.
///
/// Filenames are unique within a ledger and are basenames only. Iteration
/// is always in ascending byte order, which is what keeps serialized
/// ledgers reproducible.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    entries: BTreeMap<String, LedgerEntry>,
}

impl Ledger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contains(&self, filename: &str) -> bool {
        self.entries.contains_key(filename)
    }

    #[must_use]
    pub fn get(&self, filename: &str) -> Option<&LedgerEntry> {
        self.entries.get(filename)
    }

    pub fn get_mut(&mut self, filename: &str) -> Option<&mut LedgerEntry> {
        self.entries.get_mut(filename)
    }

    pub fn insert(&mut self, filename: String, entry: LedgerEntry) {
        self.entries.insert(filename, entry);
    }

    pub fn remove(&mut self, filename: &str) -> Option<LedgerEntry> {
        self.entries.remove(filename)
    }

    /// Entries in filename order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &LedgerEntry)> {
        self.entries.iter()
    }

    /// Filenames in ascending byte order.
    #[must_use]
    pub fn filenames(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Insert blank entries for listed files not yet present.
    ///
    /// Never removes rows: files that have disappeared stay listed and are
    /// surfaced as orphans by a refresh pass, to be dropped only by an
    /// explicit cleanup against a source of truth.
    pub fn merge(&mut self, filenames: &[String]) -> usize {
        let mut inserted = 0;
        for name in filenames {
            if !self.entries.contains_key(name) {
                self.entries.insert(name.clone(), LedgerEntry::default());
                inserted += 1;
            }
        }
        inserted
    }
}
