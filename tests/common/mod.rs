//! Common test utilities

use modelsync::ledger::{Ledger, LedgerEntry};
use modelsync::store::ModelStore;
use modelsync::transport::Transport;
use std::path::Path;
use tempfile::TempDir;

/// Create a temporary model store directory for testing
pub fn create_store_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

/// Write a model file with the given content into the store
pub fn write_model(dir: &Path, name: &str, content: &[u8]) {
    std::fs::write(dir.join(name), content).expect("Failed to write model file");
}

/// Open the directory as a local model store
pub fn local_store(dir: &Path) -> ModelStore {
    ModelStore::parse(&dir.display().to_string(), Transport::default())
}

/// Load the store's persisted ledger from disk
pub async fn read_ledger(store: &ModelStore) -> Ledger {
    modelsync::ledger::load_ledger(&store.ledger_path()).await
}

/// Raw bytes of the store's persisted ledger, for byte-identity checks
#[allow(dead_code)] // Test utility for integration tests
pub fn ledger_bytes(store: &ModelStore) -> Vec<u8> {
    std::fs::read(store.ledger_path()).expect("Failed to read ledger file")
}

/// Build a ledger entry from optional field strings
#[allow(dead_code)] // Test utility for integration tests
pub fn entry(full: Option<&str>, quick: Option<&str>, size: Option<&str>) -> LedgerEntry {
    use modelsync::ledger::Fingerprint;
    LedgerEntry {
        full_hash: full.and_then(Fingerprint::from_field),
        quick_hash: quick.and_then(Fingerprint::from_field),
        size: size.and_then(Fingerprint::from_field),
    }
}
