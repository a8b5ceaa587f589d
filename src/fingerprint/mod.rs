//! Fingerprint tiers for model files.
//!
//! Three functions of increasing cost map a file to a fingerprint string:
//! the byte size (level 1), a SHA-256 digest of the first and last 4096
//! bytes (level 2), and a SHA-256 digest of the whole content (level 3).
//! Digests are rendered as lowercase hex. Failures are a distinct outcome,
//! never a fingerprint; callers record the sentinel strings instead.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use thiserror::Error;

/// Sentinel recorded in a ledger when a file could not be read.
pub const ERROR_SENTINEL: &str = "Error";

/// Sentinel recorded in a ledger when a file had zero bytes.
pub const ZERO_SIZE_SENTINEL: &str = "ZeroSize";

/// Bytes taken from each end of the file for the quick digest.
pub const QUICK_SLICE: u64 = 4096;

/// Files at or below this size are hashed whole by the quick digest.
pub const QUICK_WHOLE_LIMIT: u64 = 8192;

/// Read granularity for the full digest, bounding memory use on
/// multi-gigabyte files.
const DIGEST_CHUNK: usize = 1024 * 1024;

#[derive(Error, Debug)]
pub enum FingerprintError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl FingerprintError {
    fn read(path: &Path, source: std::io::Error) -> Self {
        Self::Read {
            path: path.display().to_string(),
            source,
        }
    }
}

/// One fingerprint tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Level {
    /// Level 1: byte size.
    Size,
    /// Level 2: digest of the first and last 4096 bytes.
    Quick,
    /// Level 3: digest of the entire content.
    Full,
}

impl Level {
    /// Every tier, cheapest first.
    pub const ALL: [Level; 3] = [Level::Size, Level::Quick, Level::Full];
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Size => f.write_str("L1"),
            Level::Quick => f.write_str("L2"),
            Level::Full => f.write_str("L3"),
        }
    }
}

/// Which tiers an operation covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LevelSelector {
    /// Size only.
    L1,
    /// Quick digest only.
    L2,
    /// Full digest only.
    L3,
    /// Every tier.
    All,
}

impl LevelSelector {
    /// The tiers this selector covers, cheapest first.
    #[must_use]
    pub fn levels(self) -> &'static [Level] {
        match self {
            LevelSelector::L1 => &[Level::Size],
            LevelSelector::L2 => &[Level::Quick],
            LevelSelector::L3 => &[Level::Full],
            LevelSelector::All => &Level::ALL,
        }
    }
}

/// Level 1: the byte length of the file.
pub fn file_size(path: &Path) -> Result<u64, FingerprintError> {
    let metadata = std::fs::metadata(path).map_err(|e| FingerprintError::read(path, e))?;
    Ok(metadata.len())
}

/// Level 2: SHA-256 of the first and last 4096 bytes.
///
/// Files of 8192 bytes or less are hashed whole, so for them the quick
/// digest equals the full digest. Catches truncation cheaply without
/// reading multi-gigabyte files end to end.
pub fn quick_digest(path: &Path) -> Result<String, FingerprintError> {
    let mut file = File::open(path).map_err(|e| FingerprintError::read(path, e))?;
    let len = file
        .metadata()
        .map_err(|e| FingerprintError::read(path, e))?
        .len();

    let mut hasher = Sha256::new();
    if len <= QUICK_WHOLE_LIMIT {
        let mut content = Vec::new();
        file.read_to_end(&mut content)
            .map_err(|e| FingerprintError::read(path, e))?;
        hasher.update(&content);
    } else {
        let mut slice = vec![0u8; QUICK_SLICE as usize];
        file.read_exact(&mut slice)
            .map_err(|e| FingerprintError::read(path, e))?;
        hasher.update(&slice);
        file.seek(SeekFrom::End(-(QUICK_SLICE as i64)))
            .map_err(|e| FingerprintError::read(path, e))?;
        file.read_exact(&mut slice)
            .map_err(|e| FingerprintError::read(path, e))?;
        hasher.update(&slice);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Level 3: SHA-256 over the entire content, read in bounded chunks.
pub fn full_digest(path: &Path) -> Result<String, FingerprintError> {
    let mut file = File::open(path).map_err(|e| FingerprintError::read(path, e))?;
    let mut hasher = Sha256::new();
    let mut chunk = vec![0u8; DIGEST_CHUNK];
    loop {
        let n = file
            .read(&mut chunk)
            .map_err(|e| FingerprintError::read(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&chunk[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
