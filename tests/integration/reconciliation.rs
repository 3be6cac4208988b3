//! Reconciliation against a ledger file on disk.

use betledger::engine::{Reconciler, WagerKey};
use betledger::storage::{BetStore, JsonFileStore};
use betledger::types::{BetStatus, EventOutcome, OutcomeBook};
use rust_decimal_macros::dec;
use std::path::PathBuf;

use crate::common::{make_graded_ledger, make_outcomes};

fn temp_path() -> PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("betledger_it_{}.json", uuid::Uuid::new_v4()));
    p
}

/// KC-BUF was regraded: the road side won in overtime.
fn make_corrected_outcomes() -> OutcomeBook {
    let mut outcomes = make_outcomes();
    outcomes.insert(EventOutcome::final_score("nfl-kc-buf", 24, 27));
    outcomes
}

fn make_store() -> (PathBuf, JsonFileStore) {
    let path = temp_path();
    let mut store = JsonFileStore::new(&path);
    store.write_wager(&make_graded_ledger(&make_outcomes())).unwrap();
    (path, store)
}

#[test]
fn test_scenario_c_verify_twice_is_identical() {
    let (path, store) = make_store();
    let reconciler = Reconciler::default();
    let corrected = make_corrected_outcomes();

    let first = reconciler.verify(&store.load_all().unwrap(), &corrected);
    let second = reconciler.verify(&store.load_all().unwrap(), &corrected);
    assert_eq!(first.discrepancies, second.discrepancies);
    assert_eq!(first.total_checked, 4);
    assert_eq!(first.discrepancies.len(), 2);

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_verify_never_writes() {
    let (path, store) = make_store();
    let before = std::fs::read_to_string(&path).unwrap();
    let _ = Reconciler::default().verify(&store.load_all().unwrap(), &make_corrected_outcomes());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_clean_after_grading() {
    let (path, store) = make_store();
    let report = Reconciler::default().verify(&store.load_all().unwrap(), &make_outcomes());
    assert!(report.is_clean());
    assert_eq!(report.total_checked, 4);
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_apply_selected_correction_round_trip() {
    let (path, mut store) = make_store();
    let reconciler = Reconciler::default();
    let corrected = make_corrected_outcomes();
    let report = reconciler.verify(&store.load_all().unwrap(), &corrected);

    let single = report
        .discrepancies
        .iter()
        .find(|d| matches!(d.wager, WagerKey::Single(_)))
        .unwrap();
    assert_eq!(single.expected_status, BetStatus::Lost);
    assert_eq!(single.expected_profit, dec!(-100));
    assert!(single.reason.contains("corrected after initial grading"));

    let applied = reconciler.apply(&mut store, &report.select(&[single.wager])).unwrap();
    assert_eq!(applied.corrected_count, 1);

    let reopened = JsonFileStore::new(&path);
    let audit = reopened.audit().unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].previous_status, BetStatus::Won);
    assert_eq!(audit[0].new_profit, Some(dec!(-100)));

    // Only the unselected group is still reported.
    let after = reconciler.verify(&reopened.load_all().unwrap(), &corrected);
    assert_eq!(after.discrepancies.len(), 1);
    assert!(matches!(after.discrepancies[0].wager, WagerKey::Group(_)));

    // Approving the group settles it as a loss on every leg.
    let group_key = after.discrepancies[0].wager;
    let mut store = reopened;
    reconciler.apply(&mut store, &after.discrepancies).unwrap();
    for leg in store.load_wager(group_key).unwrap() {
        assert_eq!(leg.profit, Some(dec!(-60)));
    }
    assert!(reconciler.verify(&store.load_all().unwrap(), &corrected).is_clean());

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_reapplying_stale_selection_is_refused() {
    let (path, mut store) = make_store();
    let reconciler = Reconciler::default();
    let report = reconciler.verify(&store.load_all().unwrap(), &make_corrected_outcomes());

    let first = reconciler.apply(&mut store, &report.discrepancies).unwrap();
    assert_eq!(first.corrected_count, 2);
    let second = reconciler.apply(&mut store, &report.discrepancies).unwrap();
    assert_eq!(second.corrected_count, 0);
    assert_eq!(second.stale.len(), 2);

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_failed_correction_write_keeps_ledger_and_audit() {
    let (path, mut store) = make_store();
    let reconciler = Reconciler::default();
    let report = reconciler.verify(&store.load_all().unwrap(), &make_corrected_outcomes());
    let before = std::fs::read_to_string(&path).unwrap();

    // A directory on the temp name makes the ledger save fail.
    let mut tmp = path.clone().into_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::create_dir(&tmp).unwrap();

    assert!(reconciler.apply(&mut store, &report.discrepancies).is_err());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
    assert!(store.audit().unwrap().is_empty());

    std::fs::remove_dir(&tmp).unwrap();
    let applied = reconciler.apply(&mut store, &report.discrepancies).unwrap();
    assert_eq!(applied.corrected_count, 2);
    assert_eq!(store.audit().unwrap().len(), applied.audit.len());

    std::fs::remove_file(&path).unwrap();
}
