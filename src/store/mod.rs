//! Local and remote model stores.
//!
//! A store is the directory a ledger describes: either a path on this
//! machine or a `user@host:/path` target reached over SSH. Enumeration is
//! restricted to recognized model files at depth one, so the ledger's own
//! file and the log subdirectory are never listed.

mod spec;

pub use spec::RemoteSpec;

use crate::fingerprint::{self, FingerprintError};
use crate::transport::{self, Transport, TransportError};
use crate::utils::{is_model_file, ledger_cache_filename, LEDGER_FILENAME};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Read(#[from] FingerprintError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Failed to enumerate {path}: {source}")]
    List {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unexpected output from remote command: {0}")]
    RemoteOutput(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

fn join_err(e: tokio::task::JoinError) -> StoreError {
    StoreError::Task(e.to_string())
}

/// A model store: the directory a ledger describes.
#[derive(Debug, Clone)]
pub enum ModelStore {
    /// A directory on this machine.
    Local(PathBuf),
    /// A directory on a remote host, reached over SSH.
    Remote {
        spec: RemoteSpec,
        transport: Transport,
    },
}

impl ModelStore {
    /// Parse a CLI target: `user@host:/path` is remote, anything else is a
    /// local directory.
    #[must_use]
    pub fn parse(raw: &str, transport: Transport) -> ModelStore {
        match RemoteSpec::parse(raw) {
            Some(spec) => ModelStore::Remote { spec, transport },
            None => ModelStore::Local(PathBuf::from(raw)),
        }
    }

    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, ModelStore::Remote { .. })
    }

    /// Human-readable identity of the store.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            ModelStore::Local(dir) => dir.display().to_string(),
            ModelStore::Remote { spec, .. } => spec.to_string(),
        }
    }

    /// Where this store's ledger lives locally.
    ///
    /// Local stores keep the ledger inside the directory itself; remote
    /// stores use a cache file in the working directory keyed by hostname,
    /// pulled before and pushed after a pass.
    #[must_use]
    pub fn ledger_path(&self) -> PathBuf {
        match self {
            ModelStore::Local(dir) => dir.join(LEDGER_FILENAME),
            ModelStore::Remote { spec, .. } => PathBuf::from(ledger_cache_filename(&spec.host)),
        }
    }

    /// List recognized model files, sorted ascending.
    pub async fn list_files(&self) -> Result<Vec<String>, StoreError> {
        match self {
            ModelStore::Local(dir) => list_local(dir),
            ModelStore::Remote { spec, transport } => {
                let output = transport
                    .ssh(&spec.target(), &transport::list_command(&spec.path))
                    .await?;
                let mut files: Vec<String> = output
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty() && is_model_file(line))
                    .map(str::to_string)
                    .collect();
                files.sort();
                Ok(files)
            }
        }
    }

    /// Byte length of one file.
    pub async fn file_size(&self, name: &str) -> Result<u64, StoreError> {
        match self {
            ModelStore::Local(dir) => {
                let path = dir.join(name);
                let size = tokio::task::spawn_blocking(move || fingerprint::file_size(&path))
                    .await
                    .map_err(join_err)??;
                Ok(size)
            }
            ModelStore::Remote { spec, transport } => {
                let command = transport::stat_size_command(&spec.file_path(name));
                let output = transport.ssh(&spec.target(), &command).await?;
                output
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| StoreError::RemoteOutput(format!("stat returned {output:?}")))
            }
        }
    }

    /// Quick digest of one file. `size` steers the remote command; the
    /// local implementation stats the file itself.
    pub async fn quick_digest(&self, name: &str, size: u64) -> Result<String, StoreError> {
        match self {
            ModelStore::Local(dir) => {
                let path = dir.join(name);
                let digest = tokio::task::spawn_blocking(move || fingerprint::quick_digest(&path))
                    .await
                    .map_err(join_err)??;
                Ok(digest)
            }
            ModelStore::Remote { spec, transport } => {
                let command = transport::quick_digest_command(&spec.file_path(name), size);
                let output = transport.ssh(&spec.target(), &command).await?;
                parse_digest(&output)
            }
        }
    }

    /// Full digest of one file.
    pub async fn full_digest(&self, name: &str) -> Result<String, StoreError> {
        match self {
            ModelStore::Local(dir) => {
                let path = dir.join(name);
                let digest = tokio::task::spawn_blocking(move || fingerprint::full_digest(&path))
                    .await
                    .map_err(join_err)??;
                Ok(digest)
            }
            ModelStore::Remote { spec, transport } => {
                let command = transport::full_digest_command(&spec.file_path(name));
                let output = transport.ssh(&spec.target(), &command).await?;
                parse_digest(&output)
            }
        }
    }

    /// Delete files from the store. Returns how many went away.
    ///
    /// Local removal failures are logged and skipped so the caller's
    /// ledger purge proceeds; a re-run retries the survivors.
    pub async fn remove_files(&self, names: &[String]) -> Result<usize, StoreError> {
        if names.is_empty() {
            return Ok(0);
        }
        match self {
            ModelStore::Local(dir) => {
                let mut removed = 0;
                for name in names {
                    let path = dir.join(name);
                    match tokio::fs::remove_file(&path).await {
                        Ok(()) => {
                            debug!("Removed {}", path.display());
                            removed += 1;
                        }
                        Err(e) => warn!("Could not remove {}: {e}", path.display()),
                    }
                }
                Ok(removed)
            }
            ModelStore::Remote { spec, transport } => {
                let paths: Vec<String> = names.iter().map(|name| spec.file_path(name)).collect();
                transport
                    .ssh(&spec.target(), &transport::remove_command(&paths))
                    .await?;
                Ok(names.len())
            }
        }
    }

    /// Fetch the remote ledger into the local cache, when one exists.
    /// A no-op for local stores, and not an error when the remote has no
    /// ledger yet (first run).
    pub async fn pull_ledger(&self) -> Result<(), StoreError> {
        if let ModelStore::Remote { spec, transport } = self {
            let remote_csv = spec.file_path(LEDGER_FILENAME);
            let probe = transport
                .ssh(&spec.target(), &transport::exists_command(&remote_csv))
                .await?;
            if probe.trim() == "exists" {
                let from = format!("{}:{remote_csv}", spec.target());
                let to = self.ledger_path().display().to_string();
                transport.scp(&from, &to).await?;
                debug!("Pulled ledger from {from}");
            } else {
                debug!("No ledger on {} yet", spec.target());
            }
        }
        Ok(())
    }

    /// Push the local ledger cache back to the remote store. A no-op for
    /// local stores.
    pub async fn push_ledger(&self) -> Result<(), StoreError> {
        if let ModelStore::Remote { spec, transport } = self {
            let from = self.ledger_path().display().to_string();
            let to = format!("{}:{}", spec.target(), spec.file_path(LEDGER_FILENAME));
            transport.scp(&from, &to).await?;
            debug!("Pushed ledger to {to}");
        }
        Ok(())
    }
}

fn list_local(dir: &Path) -> Result<Vec<String>, StoreError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| StoreError::List {
            path: dir.display().to_string(),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if is_model_file(&name) {
            files.push(name);
        }
    }
    files.sort();
    Ok(files)
}

/// First token of a `sha256sum`-style output line, validated as a digest.
fn parse_digest(output: &str) -> Result<String, StoreError> {
    output
        .split_whitespace()
        .next()
        .filter(|token| token.len() == 64 && token.chars().all(|c| c.is_ascii_hexdigit()))
        .map(str::to_lowercase)
        .ok_or_else(|| StoreError::RemoteOutput(format!("expected a digest, got {output:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_local_vs_remote() {
        let local = ModelStore::parse("/mnt/models", Transport::default());
        assert!(!local.is_remote());
        assert_eq!(
            local.ledger_path(),
            PathBuf::from("/mnt/models").join(LEDGER_FILENAME)
        );

        let remote = ModelStore::parse("root@gpu-01:/mnt/models", Transport::default());
        assert!(remote.is_remote());
        assert_eq!(remote.ledger_path(), PathBuf::from("sha256-list-gpu-01.csv"));
    }

    #[tokio::test]
    async fn test_list_local_filters_and_sorts() {
        let dir = tempdir().expect("Should create temp dir");
        std::fs::write(dir.path().join("b.ckpt"), b"x").expect("write");
        std::fs::write(dir.path().join("a.ckpt-tensordata"), b"x").expect("write");
        std::fs::write(dir.path().join("notes.txt"), b"x").expect("write");
        std::fs::write(dir.path().join(LEDGER_FILENAME), b"x").expect("write");
        std::fs::create_dir(dir.path().join("logs")).expect("mkdir");
        std::fs::write(dir.path().join("logs").join("c.ckpt"), b"x").expect("write");

        let store = ModelStore::Local(dir.path().to_path_buf());
        let files = store.list_files().await.expect("Should list");
        assert_eq!(files, vec!["a.ckpt-tensordata", "b.ckpt"]);
    }

    #[tokio::test]
    async fn test_local_fingerprints_match_direct_computation() {
        let dir = tempdir().expect("Should create temp dir");
        let path = dir.path().join("m.ckpt");
        std::fs::write(&path, vec![9u8; 10_000]).expect("write");

        let store = ModelStore::Local(dir.path().to_path_buf());
        assert_eq!(store.file_size("m.ckpt").await.expect("size"), 10_000);
        assert_eq!(
            store.quick_digest("m.ckpt", 10_000).await.expect("quick"),
            crate::fingerprint::quick_digest(&path).expect("quick direct")
        );
        assert_eq!(
            store.full_digest("m.ckpt").await.expect("full"),
            crate::fingerprint::full_digest(&path).expect("full direct")
        );
    }

    #[tokio::test]
    async fn test_remove_files_skips_missing() {
        let dir = tempdir().expect("Should create temp dir");
        std::fs::write(dir.path().join("a.ckpt"), b"x").expect("write");

        let store = ModelStore::Local(dir.path().to_path_buf());
        let removed = store
            .remove_files(&["a.ckpt".to_string(), "ghost.ckpt".to_string()])
            .await
            .expect("Should remove");
        assert_eq!(removed, 1);
        assert!(!dir.path().join("a.ckpt").exists());
    }

    #[test]
    fn test_parse_digest() {
        let digest = "a".repeat(64);
        assert_eq!(
            parse_digest(&format!("{digest}  /mnt/models/m.ckpt")).expect("Should parse"),
            digest
        );
        assert!(parse_digest("sha256sum: missing operand").is_err());
        assert!(parse_digest("").is_err());
    }
}
