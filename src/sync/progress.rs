//! Progress reporting for one sync run.
//!
//! Workers report through an mpsc channel owned by the run. Nothing is
//! process-global: when the run ends the channel and its logger go away.

use std::fmt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

/// Phase a server sync is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Refreshing,
    Comparing,
    Downloading,
    Verifying,
    Done,
    Failed,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncPhase::Refreshing => f.write_str("refreshing checksums"),
            SyncPhase::Comparing => f.write_str("comparing against source of truth"),
            SyncPhase::Downloading => f.write_str("downloading"),
            SyncPhase::Verifying => f.write_str("verifying"),
            SyncPhase::Done => f.write_str("done"),
            SyncPhase::Failed => f.write_str("failed"),
        }
    }
}

/// One progress event from a server worker.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub server: String,
    pub phase: SyncPhase,
    pub files_done: usize,
    pub files_total: usize,
}

/// Sending half handed to each worker.
pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;

/// Spawn a task that logs progress events until every sender is dropped.
pub fn spawn_progress_logger() -> (ProgressSender, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<ProgressEvent>();
    let handle = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if event.files_total > 0 {
                info!(
                    server = %event.server,
                    "{} ({}/{} files)",
                    event.phase, event.files_done, event.files_total
                );
            } else {
                info!(server = %event.server, "{}", event.phase);
            }
        }
    });
    (tx, handle)
}
