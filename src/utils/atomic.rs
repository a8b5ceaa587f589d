//! Atomic file replacement.
//!
//! A ledger rewrite must leave the previous valid version intact until the
//! new one is fully on disk, so writes go through a temp file in the target
//! directory followed by a rename.

use std::io;
use std::path::Path;
use tempfile::NamedTempFile;

/// Write `content` to `path`, replacing any existing file in one rename.
///
/// The temp file is created next to the target (a rename across filesystems
/// is not atomic) and cleaned up automatically if any step fails.
pub async fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    let target = path.to_path_buf();
    let content = content.to_vec();

    tokio::task::spawn_blocking(move || -> io::Result<()> {
        use std::io::Write as _;

        let mut temp = NamedTempFile::new_in(&parent)?;
        temp.write_all(&content)?;
        temp.flush()?;
        temp.persist(&target)?;
        Ok(())
    })
    .await
    .map_err(io::Error::other)?
}
