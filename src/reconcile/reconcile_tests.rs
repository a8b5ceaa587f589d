use super::*;
use crate::ledger::LedgerEntry;

fn ledger_with(rows: &[(&str, Option<&str>, Option<&str>, Option<&str>)]) -> Ledger {
    let mut ledger = Ledger::new();
    for (name, full, quick, size) in rows {
        ledger.insert(
            (*name).to_string(),
            LedgerEntry {
                full_hash: full.and_then(Fingerprint::from_field),
                quick_hash: quick.and_then(Fingerprint::from_field),
                size: size.and_then(Fingerprint::from_field),
            },
        );
    }
    ledger
}

#[test]
fn test_classify_rules_in_order() {
    let value = |s: &str| Some(Fingerprint::Value(s.to_string()));
    assert_eq!(classify(None, None), Classification::BothEmpty);
    assert_eq!(classify(None, value("x").as_ref()), Classification::ToFetch);
    assert_eq!(classify(value("x").as_ref(), None), Classification::Extraneous);
    assert_eq!(
        classify(value("x").as_ref(), value("x").as_ref()),
        Classification::Unchanged
    );
    assert_eq!(
        classify(value("x").as_ref(), value("y").as_ref()),
        Classification::Mismatched
    );
}

#[test]
fn test_same_size_missing_quick_hash() {
    // Matching at L1 does not imply anything at L2.
    let candidate = ledger_with(&[("m.ckpt", None, None, Some("100"))]);
    let truth = ledger_with(&[("m.ckpt", None, Some("abc"), Some("100"))]);

    let l1 = reconcile_level(&candidate, &truth, Level::Size);
    assert_eq!(l1.unchanged, vec!["m.ckpt"]);
    assert!(l1.sync_set().is_empty());

    let l2 = reconcile_level(&candidate, &truth, Level::Quick);
    assert_eq!(l2.to_fetch, vec!["m.ckpt"]);
    assert_eq!(l2.sync_set(), vec!["m.ckpt"]);
}

#[test]
fn test_mismatched_hashes_carry_both_values() {
    let candidate = ledger_with(&[("m.ckpt", Some("abc"), None, None)]);
    let truth = ledger_with(&[("m.ckpt", Some("xyz"), None, None)]);

    let report = reconcile_level(&candidate, &truth, Level::Full);
    assert_eq!(
        report.mismatched,
        vec![Mismatch {
            filename: "m.ckpt".to_string(),
            candidate: "abc".to_string(),
            truth: "xyz".to_string(),
        }]
    );
    assert_eq!(report.sync_set(), vec!["m.ckpt"]);
}

#[test]
fn test_sentinel_against_real_hash_is_mismatched() {
    let candidate = ledger_with(&[("m.ckpt", Some("Error"), None, None)]);
    let truth = ledger_with(&[("m.ckpt", Some("abc"), None, None)]);

    let report = reconcile_level(&candidate, &truth, Level::Full);
    assert_eq!(report.mismatched.len(), 1);
    assert!(report.unchanged.is_empty());
}

#[test]
fn test_two_error_sentinels_still_mismatch() {
    let candidate = ledger_with(&[("m.ckpt", Some("Error"), None, None)]);
    let truth = ledger_with(&[("m.ckpt", Some("Error"), None, None)]);

    let report = reconcile_level(&candidate, &truth, Level::Full);
    assert_eq!(report.mismatched.len(), 1);
    assert_eq!(report.mismatched[0].candidate, "Error");
    assert_eq!(report.mismatched[0].truth, "Error");
}

#[test]
fn test_extraneous_is_reported_not_fetched() {
    let candidate = ledger_with(&[("local-only.ckpt", Some("abc"), None, None)]);
    let truth = Ledger::new();

    let report = reconcile_level(&candidate, &truth, Level::Full);
    assert_eq!(report.extraneous, vec!["local-only.ckpt"]);
    assert!(report.sync_set().is_empty());
    assert!(report.has_differences());
}

#[test]
fn test_swap_symmetry() {
    let a = ledger_with(&[
        ("fetch-me.ckpt", None, None, None),
        ("same.ckpt", Some("h"), None, None),
        ("diff.ckpt", Some("a"), None, None),
        ("extra.ckpt", Some("e"), None, None),
    ]);
    let b = ledger_with(&[
        ("fetch-me.ckpt", Some("h2"), None, None),
        ("same.ckpt", Some("h"), None, None),
        ("diff.ckpt", Some("b"), None, None),
    ]);

    let forward = reconcile_level(&a, &b, Level::Full);
    let backward = reconcile_level(&b, &a, Level::Full);

    // Swapping the ledgers swaps toFetch and extraneous...
    assert_eq!(forward.to_fetch, backward.extraneous);
    assert_eq!(forward.extraneous, backward.to_fetch);
    // ...while unchanged and mismatched membership stays put.
    assert_eq!(forward.unchanged, backward.unchanged);
    let forward_mismatched: Vec<&str> =
        forward.mismatched.iter().map(|m| m.filename.as_str()).collect();
    let backward_mismatched: Vec<&str> =
        backward.mismatched.iter().map(|m| m.filename.as_str()).collect();
    assert_eq!(forward_mismatched, backward_mismatched);
}

#[test]
fn test_sync_set_is_sorted_and_deduplicated() {
    let candidate = ledger_with(&[
        ("b.ckpt", Some("a"), None, None),
        ("c.ckpt", None, None, None),
    ]);
    let truth = ledger_with(&[
        ("b.ckpt", Some("z"), None, None),
        ("c.ckpt", Some("y"), None, None),
        ("a.ckpt", Some("x"), None, None),
    ]);

    let report = reconcile_level(&candidate, &truth, Level::Full);
    assert_eq!(report.sync_set(), vec!["a.ckpt", "b.ckpt", "c.ckpt"]);
}

#[test]
fn test_all_levels_reports_each_level_separately() {
    // Same size, different content: only L3 should flag it.
    let candidate = ledger_with(&[("m.ckpt", Some("aaa"), Some("qqq"), Some("100"))]);
    let truth = ledger_with(&[("m.ckpt", Some("bbb"), Some("qqq"), Some("100"))]);

    let report = reconcile(&candidate, &truth, LevelSelector::All);
    assert_eq!(report.levels.len(), 3);

    let by_level = |level: Level| {
        report
            .levels
            .iter()
            .find(|r| r.level == level)
            .expect("level present")
    };
    assert_eq!(by_level(Level::Size).unchanged, vec!["m.ckpt"]);
    assert_eq!(by_level(Level::Quick).unchanged, vec!["m.ckpt"]);
    assert_eq!(by_level(Level::Full).mismatched.len(), 1);

    // The combined sync set unions the per-level sets.
    assert_eq!(report.sync_set(), vec!["m.ckpt"]);
}

#[test]
fn test_both_empty_is_no_action() {
    let candidate = ledger_with(&[("m.ckpt", None, None, None)]);
    let truth = ledger_with(&[("m.ckpt", None, None, None)]);

    let report = reconcile_level(&candidate, &truth, Level::Full);
    assert_eq!(report.both_empty, vec!["m.ckpt"]);
    assert!(!report.has_differences());
    assert!(report.sync_set().is_empty());
}
