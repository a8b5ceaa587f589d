#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{create_store_dir, local_store, read_ledger, write_model};
use modelsync::cleanup::{cleanup_store, CleanupOptions};
use modelsync::fingerprint::LevelSelector;
use modelsync::refresh::{refresh_store, RefreshOptions};
use std::collections::BTreeSet;

fn truth(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|n| (*n).to_string()).collect()
}

async fn refreshed_store(dir: &std::path::Path) -> modelsync::store::ModelStore {
    let store = local_store(dir);
    refresh_store(
        &store,
        RefreshOptions {
            selector: LevelSelector::L3,
            force: false,
            dry_run: false,
        },
    )
    .await
    .expect("Should refresh");
    store
}

#[tokio::test]
async fn test_cleanup_removes_unattested_files_and_rows() {
    let dir = create_store_dir();
    write_model(dir.path(), "keep.ckpt", b"keep");
    write_model(dir.path(), "drop.ckpt", b"drop");
    let store = refreshed_store(dir.path()).await;

    let report = cleanup_store(&store, &truth(&["keep.ckpt"]), CleanupOptions { dry_run: false })
        .await
        .expect("Should clean");

    assert_eq!(report.extraneous, vec!["drop.ckpt"]);
    assert_eq!(report.removed, 1);
    assert_eq!(report.kept, 1);
    assert!(!dir.path().join("drop.ckpt").exists());
    assert!(dir.path().join("keep.ckpt").exists());

    let ledger = read_ledger(&store).await;
    assert!(ledger.contains("keep.ckpt"));
    assert!(!ledger.contains("drop.ckpt"));
}

#[tokio::test]
async fn test_cleanup_drops_orphan_rows() {
    let dir = create_store_dir();
    write_model(dir.path(), "keep.ckpt", b"keep");
    write_model(dir.path(), "vanished.ckpt", b"gone soon");
    let store = refreshed_store(dir.path()).await;

    // The file disappears outside our control; its row is now an orphan.
    std::fs::remove_file(dir.path().join("vanished.ckpt")).expect("remove");

    let report = cleanup_store(&store, &truth(&["keep.ckpt"]), CleanupOptions { dry_run: false })
        .await
        .expect("Should clean");

    // Nothing extraneous on disk, but the orphan row goes away here.
    assert!(report.extraneous.is_empty());
    assert_eq!(report.dropped_entries, vec!["vanished.ckpt"]);
    assert!(!read_ledger(&store).await.contains("vanished.ckpt"));
}

#[tokio::test]
async fn test_cleanup_keeps_orphan_rows_attested_by_truth() {
    let dir = create_store_dir();
    write_model(dir.path(), "keep.ckpt", b"keep");
    write_model(dir.path(), "missing.ckpt", b"will vanish");
    let store = refreshed_store(dir.path()).await;
    std::fs::remove_file(dir.path().join("missing.ckpt")).expect("remove");

    // The source of truth still attests the vanished file: its row stays,
    // flagging that the file needs to be fetched again.
    let report = cleanup_store(
        &store,
        &truth(&["keep.ckpt", "missing.ckpt"]),
        CleanupOptions { dry_run: false },
    )
    .await
    .expect("Should clean");

    assert!(report.dropped_entries.is_empty());
    assert!(read_ledger(&store).await.contains("missing.ckpt"));
}

#[tokio::test]
async fn test_dry_run_computes_same_classification_without_mutating() {
    let dir = create_store_dir();
    write_model(dir.path(), "keep.ckpt", b"keep");
    write_model(dir.path(), "drop.ckpt", b"drop");
    let store = refreshed_store(dir.path()).await;

    let dry = cleanup_store(&store, &truth(&["keep.ckpt"]), CleanupOptions { dry_run: true })
        .await
        .expect("Should dry-run");

    assert_eq!(dry.extraneous, vec!["drop.ckpt"]);
    assert_eq!(dry.dropped_entries, vec!["drop.ckpt"]);
    assert_eq!(dry.removed, 0);
    assert!(dir.path().join("drop.ckpt").exists());
    assert!(read_ledger(&store).await.contains("drop.ckpt"));

    // The real run classifies identically.
    let real = cleanup_store(&store, &truth(&["keep.ckpt"]), CleanupOptions { dry_run: false })
        .await
        .expect("Should clean");
    assert_eq!(real.extraneous, dry.extraneous);
    assert_eq!(real.dropped_entries, dry.dropped_entries);
    assert_eq!(real.removed, 1);
}
