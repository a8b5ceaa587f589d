#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{create_store_dir, ledger_bytes, local_store, read_ledger, write_model};
use modelsync::fingerprint::{Level, LevelSelector};
use modelsync::ledger::Fingerprint;
use modelsync::refresh::{refresh_store, RefreshOptions};

fn options(selector: LevelSelector) -> RefreshOptions {
    RefreshOptions {
        selector,
        force: false,
        dry_run: false,
    }
}

#[tokio::test]
async fn test_first_pass_records_every_tier() {
    let dir = create_store_dir();
    write_model(dir.path(), "a.ckpt", &[1u8; 10_000]);
    write_model(dir.path(), "b.ckpt-tensordata", b"small");
    let store = local_store(dir.path());

    let report = refresh_store(&store, options(LevelSelector::All))
        .await
        .expect("Should refresh");

    assert_eq!(report.computed, vec!["a.ckpt", "b.ckpt-tensordata"]);
    assert!(report.purged.is_empty());

    let ledger = read_ledger(&store).await;
    let entry = ledger.get("a.ckpt").expect("entry");
    assert_eq!(
        entry.level(Level::Size),
        Some(&Fingerprint::Value("10000".to_string()))
    );
    assert!(matches!(entry.level(Level::Quick), Some(Fingerprint::Value(_))));
    assert!(matches!(entry.level(Level::Full), Some(Fingerprint::Value(_))));
}

#[tokio::test]
async fn test_refresh_is_idempotent() {
    let dir = create_store_dir();
    write_model(dir.path(), "a.ckpt", &[7u8; 9_000]);
    write_model(dir.path(), "b.ckpt", b"tiny");
    let store = local_store(dir.path());

    let first = refresh_store(&store, options(LevelSelector::All))
        .await
        .expect("Should refresh");
    assert_eq!(first.computed.len(), 2);
    let bytes_after_first = ledger_bytes(&store);

    let second = refresh_store(&store, options(LevelSelector::All))
        .await
        .expect("Should refresh again");
    assert!(second.computed.is_empty());
    assert_eq!(second.skipped, 2);
    assert_eq!(ledger_bytes(&store), bytes_after_first);
}

#[tokio::test]
async fn test_quick_equals_full_for_small_files_in_ledger() {
    let dir = create_store_dir();
    write_model(dir.path(), "small.ckpt", &[2u8; 4_000]);
    let store = local_store(dir.path());

    refresh_store(&store, options(LevelSelector::All))
        .await
        .expect("Should refresh");

    let ledger = read_ledger(&store).await;
    let entry = ledger.get("small.ckpt").expect("entry");
    assert_eq!(entry.level(Level::Quick), entry.level(Level::Full));
}

#[tokio::test]
async fn test_zero_size_file_is_purged() {
    let dir = create_store_dir();
    write_model(dir.path(), "empty.ckpt", b"");
    write_model(dir.path(), "good.ckpt", b"content");
    let store = local_store(dir.path());

    let report = refresh_store(&store, options(LevelSelector::L1))
        .await
        .expect("Should refresh");

    assert_eq!(report.purged.len(), 1);
    assert_eq!(report.purged[0].filename, "empty.ckpt");
    assert_eq!(report.purged[0].reason, Fingerprint::ZeroSize);

    // Removed from disk and from the ledger, all fields.
    assert!(!dir.path().join("empty.ckpt").exists());
    let ledger = read_ledger(&store).await;
    assert!(!ledger.contains("empty.ckpt"));
    assert!(ledger.contains("good.ckpt"));
}

#[tokio::test]
async fn test_zero_size_skips_higher_tiers() {
    let dir = create_store_dir();
    write_model(dir.path(), "empty.ckpt", b"");
    let store = local_store(dir.path());

    // An all-tiers pass on a zero-size file must not hash it at L2/L3;
    // it is condemned straight away and purged at end of pass.
    let report = refresh_store(&store, options(LevelSelector::All))
        .await
        .expect("Should refresh");
    assert_eq!(report.purged[0].reason, Fingerprint::ZeroSize);
    assert!(report.computed.is_empty());
}

#[tokio::test]
async fn test_orphan_entries_are_reported_not_removed() {
    let dir = create_store_dir();
    write_model(dir.path(), "present.ckpt", b"content");
    let store = local_store(dir.path());

    refresh_store(&store, options(LevelSelector::L3))
        .await
        .expect("Should refresh");

    // File disappears after its row exists.
    std::fs::remove_file(dir.path().join("present.ckpt")).expect("remove");
    write_model(dir.path(), "other.ckpt", b"new content");

    let report = refresh_store(&store, options(LevelSelector::L3))
        .await
        .expect("Should refresh");

    assert_eq!(report.orphans, vec!["present.ckpt"]);
    let ledger = read_ledger(&store).await;
    assert!(
        ledger.contains("present.ckpt"),
        "a plain refresh never drops orphan rows"
    );
}

#[tokio::test]
async fn test_force_recomputes_existing_values() {
    let dir = create_store_dir();
    write_model(dir.path(), "m.ckpt", b"version one");
    let store = local_store(dir.path());

    refresh_store(&store, options(LevelSelector::L3))
        .await
        .expect("Should refresh");
    let before = read_ledger(&store).await;
    let hash_before = before.get("m.ckpt").unwrap().level(Level::Full).cloned();

    // Content changes; a plain refresh keeps the stale value, force fixes it.
    write_model(dir.path(), "m.ckpt", b"version two");
    refresh_store(&store, options(LevelSelector::L3))
        .await
        .expect("Should refresh");
    let stale = read_ledger(&store).await;
    assert_eq!(stale.get("m.ckpt").unwrap().level(Level::Full).cloned(), hash_before);

    let forced = refresh_store(
        &store,
        RefreshOptions {
            selector: LevelSelector::L3,
            force: true,
            dry_run: false,
        },
    )
    .await
    .expect("Should refresh");
    assert_eq!(forced.computed, vec!["m.ckpt"]);
    let after = read_ledger(&store).await;
    assert_ne!(after.get("m.ckpt").unwrap().level(Level::Full).cloned(), hash_before);
}

#[tokio::test]
async fn test_recorded_sentinel_is_healed_by_next_pass() {
    let dir = create_store_dir();
    write_model(dir.path(), "bad.ckpt", b"content");
    let store = local_store(dir.path());

    // Simulate a pass that crashed between persisting the sentinel and
    // purging: the ledger says Error, the file is still there.
    std::fs::write(
        store.ledger_path(),
        "filename,sha256sum,8k_sha256sum,filesize\nbad.ckpt,Error,,\n",
    )
    .expect("write ledger");

    let report = refresh_store(&store, options(LevelSelector::L3))
        .await
        .expect("Should refresh");

    assert_eq!(report.purged.len(), 1);
    assert_eq!(report.purged[0].reason, Fingerprint::Error);
    assert!(!dir.path().join("bad.ckpt").exists());
    assert!(!read_ledger(&store).await.contains("bad.ckpt"));
}

#[tokio::test]
async fn test_dry_run_mutates_nothing() {
    let dir = create_store_dir();
    write_model(dir.path(), "empty.ckpt", b"");
    write_model(dir.path(), "new.ckpt", b"content");
    let store = local_store(dir.path());

    let report = refresh_store(
        &store,
        RefreshOptions {
            selector: LevelSelector::All,
            force: false,
            dry_run: true,
        },
    )
    .await
    .expect("Should dry-run");

    assert_eq!(report.would_process, vec!["empty.ckpt", "new.ckpt"]);
    assert!(report.purged.is_empty());
    assert!(dir.path().join("empty.ckpt").exists());
    assert!(
        !store.ledger_path().exists(),
        "dry run must not create the ledger"
    );
}

#[tokio::test]
async fn test_blank_rows_are_persisted_before_hashing() {
    let dir = create_store_dir();
    write_model(dir.path(), "a.ckpt", b"content");
    let store = local_store(dir.path());

    refresh_store(&store, options(LevelSelector::L1))
        .await
        .expect("Should refresh");

    // An L1-only pass leaves the digest columns empty but the row listed.
    let ledger = read_ledger(&store).await;
    let entry = ledger.get("a.ckpt").expect("entry");
    assert!(entry.level(Level::Quick).is_none());
    assert!(entry.level(Level::Full).is_none());
    assert_eq!(
        entry.level(Level::Size),
        Some(&Fingerprint::Value("7".to_string()))
    );
}
