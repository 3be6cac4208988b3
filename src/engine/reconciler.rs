//! Reconciliation — recompute graded wagers and diff against storage.
//!
//! `verify` is read-only and deterministic: the same bets and outcomes
//! always produce the same report. `apply` is the manual approval gate:
//! it writes only the records the caller hands back, and only if the
//! stored legs still look exactly as they did when the record was made.

use anyhow::{Context, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::settlement::{Settlement, SettlementEngine};
use super::wager::{assemble, Wager, WagerKey};
use crate::storage::{AuditEntry, BetStore};
use crate::types::{Bet, BetStatus, LedgerError, MarketType, OutcomeBook};

/// Stored and recomputed observed values closer than this are equal.
const VALUE_TOLERANCE: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

/// A graded wager whose stored state disagrees with a fresh settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscrepancyRecord {
    pub wager: WagerKey,
    pub bet_ids: Vec<Uuid>,
    pub stored_status: BetStatus,
    pub stored_profit: Option<Decimal>,
    pub expected_status: BetStatus,
    pub expected_profit: Decimal,
    pub reason: String,
    /// Full recomputed settlement, written by `apply`.
    pub expected: Settlement,
    /// Stored legs at verification time.
    pub stored_legs: Vec<Bet>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// Graded wagers that were recomputed.
    pub total_checked: usize,
    /// Sorted by wager key.
    pub discrepancies: Vec<DiscrepancyRecord>,
    /// Structurally invalid stored units, as `DataIntegrity` errors.
    pub integrity_errors: Vec<LedgerError>,
    /// Graded wagers whose events currently have no finalized result.
    pub awaiting_results: usize,
    /// Pending wagers that could already be settled.
    pub ungraded: usize,
}

impl ReconciliationReport {
    pub fn is_clean(&self) -> bool {
        self.discrepancies.is_empty() && self.integrity_errors.is_empty()
    }

    /// Records for the given wagers, in report order.
    pub fn select(&self, keys: &[WagerKey]) -> Vec<DiscrepancyRecord> {
        self.discrepancies
            .iter()
            .filter(|d| keys.contains(&d.wager))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    pub corrected_count: usize,
    /// Selected records whose stored legs changed since verification.
    pub stale: Vec<WagerKey>,
    pub audit: Vec<AuditEntry>,
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    engine: SettlementEngine,
}

impl Reconciler {
    pub fn new(engine: SettlementEngine) -> Self {
        Self { engine }
    }

    /// Recompute every graded wager whose events are finalized and report
    /// where storage disagrees.
    pub fn verify(&self, bets: &[Bet], outcomes: &OutcomeBook) -> ReconciliationReport {
        let assembly = assemble(bets);
        let mut report = ReconciliationReport {
            integrity_errors: assembly.violations,
            ..ReconciliationReport::default()
        };

        for wager in &assembly.wagers {
            if wager.is_pending() {
                let ready = wager.event_ids().iter().all(|id| outcomes.finalized(id).is_ok());
                if ready {
                    report.ungraded += 1;
                }
                continue;
            }

            let expected = match self.engine.settle(wager, outcomes) {
                Ok(expected) => expected,
                Err(e) if e.is_retryable() => {
                    report.awaiting_results += 1;
                    continue;
                }
                Err(e) => {
                    report.integrity_errors.push(LedgerError::DataIntegrity {
                        wager: wager.key().to_string(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            report.total_checked += 1;

            if let Some(reason) = explain(wager, &expected) {
                report.discrepancies.push(DiscrepancyRecord {
                    wager: wager.key(),
                    bet_ids: wager.legs().iter().map(|b| b.id).collect(),
                    stored_status: wager.stored_status(),
                    stored_profit: wager.stored_profit(),
                    expected_status: expected.status,
                    expected_profit: expected.profit,
                    reason,
                    expected,
                    stored_legs: wager.legs().to_vec(),
                });
            }
        }

        report.discrepancies.sort_by_key(|d| d.wager);

        for e in &report.integrity_errors {
            warn!(error = %e, "Stored state failed integrity checks");
        }
        info!(
            checked = report.total_checked,
            discrepancies = report.discrepancies.len(),
            integrity_errors = report.integrity_errors.len(),
            awaiting = report.awaiting_results,
            ungraded = report.ungraded,
            "Reconciliation verified"
        );
        report
    }

    /// Write the selected corrections. Each wager's legs and their audit
    /// entries go to the store in one atomic write.
    pub fn apply<S>(&self, store: &mut S, selected: &[DiscrepancyRecord]) -> Result<ApplyReport>
    where
        S: BetStore + ?Sized,
    {
        let mut report = ApplyReport::default();

        for record in selected {
            let current = store
                .load_wager(record.wager)
                .context(format!("Failed to load {}", record.wager))?;
            if current != record.stored_legs {
                warn!(wager = %record.wager, "Stored legs changed since verification, skipping");
                report.stale.push(record.wager);
                continue;
            }

            let mut legs = current;
            record.expected.apply_to(&mut legs);

            let recorded_at = Utc::now();
            let entries: Vec<AuditEntry> = record
                .stored_legs
                .iter()
                .zip(&legs)
                .map(|(before, after)| AuditEntry {
                    wager: record.wager,
                    bet_id: after.id,
                    previous_status: before.status,
                    previous_profit: before.profit,
                    new_status: after.status,
                    new_profit: after.profit,
                    reason: record.reason.clone(),
                    recorded_at,
                })
                .collect();
            store
                .write_audited(&legs, &entries)
                .context(format!("Failed to write audited correction for {}", record.wager))?;
            report.audit.extend(entries);

            info!(
                wager = %record.wager,
                from = %record.stored_status,
                to = %record.expected_status,
                profit = format!("${:.2}", record.expected_profit),
                "Correction applied"
            );
            report.corrected_count += 1;
        }

        Ok(report)
    }
}

/// Why the stored wager disagrees with `expected`, or `None` if it agrees.
fn explain(wager: &Wager, expected: &Settlement) -> Option<String> {
    let mut reasons: Vec<String> = Vec::new();
    fn push(reasons: &mut Vec<String>, reason: String) {
        if !reasons.contains(&reason) {
            reasons.push(reason);
        }
    }

    for stored in wager.legs() {
        let Some(fresh) = expected.leg(stored.id) else {
            continue;
        };
        let value_changed = !same_value(stored.result_value, fresh.result_value);
        if value_changed && stored.selection.market == MarketType::Prop {
            push(&mut reasons, "leg classification changed due to updated stat".to_string());
        } else if value_changed {
            push(&mut reasons, "event result was corrected after initial grading".to_string());
        } else if stored.status != fresh.status {
            push(
                &mut reasons,
                format!(
                    "leg {} stored as {} but grades as {}",
                    stored.id, stored.status, fresh.status
                ),
            );
        }
    }

    let stored_status = wager.stored_status();
    if reasons.is_empty() && stored_status != expected.status {
        push(&mut reasons, format!("stored status {stored_status} but recomputed {}", expected.status));
    }
    if wager.legs().iter().any(|b| b.profit != Some(expected.profit)) {
        let stored = wager
            .stored_profit()
            .map(|p| format!("${p:.2}"))
            .unwrap_or_else(|| "none".into());
        push(&mut reasons, format!("stored profit {stored} differs from recomputed ${:.2}", expected.profit));
    }

    if reasons.is_empty() {
        None
    } else {
        Some(reasons.join("; "))
    }
}

fn same_value(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (Some(x), Some(y)) => (x - y).abs() <= VALUE_TOLERANCE,
        (None, None) => true,
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, MockBetStore};
    use crate::types::{EventOutcome, Selection, SelectionSide};
    use rust_decimal_macros::dec;

    fn make_book(home: u32, away: u32) -> OutcomeBook {
        vec![
            EventOutcome::final_score("e1", home, away),
            EventOutcome::final_score("e2", 98, 105),
            EventOutcome::final_score("nba-7", 110, 104).with_stat("Jalen Brunson", "points", 27.0),
        ]
        .into()
    }

    /// A correctly graded ledger: one single, one parlay, one pending prop.
    fn make_ledger(book: &OutcomeBook) -> Vec<Bet> {
        let engine = SettlementEngine::default();
        let mut bets = vec![Bet::single(Selection::moneyline("e1", SelectionSide::Home), 150, dec!(100)).unwrap()];
        bets.extend(
            Bet::parlay(
                vec![
                    (Selection::moneyline("e1", SelectionSide::Home), -150),
                    (Selection::moneyline("e2", SelectionSide::Away), 120),
                ],
                dec!(50),
            )
            .unwrap(),
        );
        bets.push(
            Bet::single(
                Selection::prop("nba-7", "Jalen Brunson", "points", SelectionSide::Over, 25.5),
                -115,
                dec!(23),
            )
            .unwrap(),
        );
        bets.push(Bet::single(Selection::moneyline("e-later", SelectionSide::Away), 110, dec!(10)).unwrap());

        let wagers = assemble(&bets).wagers;
        for s in engine.settle_all(&wagers, book).settled {
            s.apply_to(&mut bets);
        }
        bets
    }

    #[test]
    fn test_clean_ledger_has_no_discrepancies() {
        let book = make_book(24, 17);
        let bets = make_ledger(&book);
        let report = Reconciler::default().verify(&bets, &book);
        assert!(report.is_clean(), "{:?}", report.discrepancies);
        assert_eq!(report.total_checked, 3);
        assert_eq!(report.ungraded, 0);
    }

    #[test]
    fn test_corrected_score_is_reported() {
        let bets = make_ledger(&make_book(24, 17));
        let corrected = make_book(17, 24);
        let report = Reconciler::default().verify(&bets, &corrected);

        assert_eq!(report.discrepancies.len(), 2);
        let single = report
            .discrepancies
            .iter()
            .find(|d| matches!(d.wager, WagerKey::Single(_)))
            .unwrap();
        assert_eq!(single.stored_status, BetStatus::Won);
        assert_eq!(single.stored_profit, Some(dec!(150)));
        assert_eq!(single.expected_status, BetStatus::Lost);
        assert_eq!(single.expected_profit, dec!(-100));
        assert!(single.reason.contains("event result was corrected"));

        let group = report
            .discrepancies
            .iter()
            .find(|d| matches!(d.wager, WagerKey::Group(_)))
            .unwrap();
        assert_eq!(group.bet_ids.len(), 2);
        assert_eq!(group.expected_profit, dec!(-50));
    }

    #[test]
    fn test_updated_stat_is_reported() {
        let book = make_book(24, 17);
        let bets = make_ledger(&book);
        let mut updated = book.clone();
        updated.insert(EventOutcome::final_score("nba-7", 110, 104).with_stat("Jalen Brunson", "points", 24.0));

        let report = Reconciler::default().verify(&bets, &updated);
        assert_eq!(report.discrepancies.len(), 1);
        let d = &report.discrepancies[0];
        assert_eq!(d.expected_status, BetStatus::Lost);
        assert_eq!(d.reason, "leg classification changed due to updated stat; stored profit $20.00 differs from recomputed $-23.00");
    }

    #[test]
    fn test_tampered_profit_is_reported() {
        let book = make_book(24, 17);
        let mut bets = make_ledger(&book);
        bets[0].profit = Some(dec!(149));
        let report = Reconciler::default().verify(&bets, &book);
        assert_eq!(report.discrepancies.len(), 1);
        assert!(report.discrepancies[0].reason.starts_with("stored profit $149.00"));
    }

    #[test]
    fn test_verify_is_idempotent() {
        let bets = make_ledger(&make_book(24, 17));
        let corrected = make_book(10, 31);
        let reconciler = Reconciler::default();
        let first = reconciler.verify(&bets, &corrected);
        let second = reconciler.verify(&bets, &corrected);
        assert_eq!(first, second);
        assert!(!first.discrepancies.is_empty());
    }

    #[test]
    fn test_discrepancies_sorted_by_key() {
        let bets = make_ledger(&make_book(24, 17));
        let report = Reconciler::default().verify(&bets, &make_book(0, 3));
        let keys: Vec<WagerKey> = report.discrepancies.iter().map(|d| d.wager).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn test_integrity_errors_surface_in_report() {
        let book = make_book(24, 17);
        let mut bets = make_ledger(&book);
        bets[1].original_stake = dec!(70);
        let report = Reconciler::default().verify(&bets, &book);
        assert_eq!(report.integrity_errors.len(), 1);
        assert!(matches!(report.integrity_errors[0], LedgerError::DataIntegrity { .. }));
        assert_eq!(report.total_checked, 2);
    }

    #[test]
    fn test_ungraded_and_awaiting_counts() {
        let book = make_book(24, 17);
        let bets = make_ledger(&book);
        let mut later = book.clone();
        later.insert(EventOutcome::final_score("e-later", 1, 2));
        let report = Reconciler::default().verify(&bets, &later);
        assert_eq!(report.ungraded, 1);

        let mut missing = OutcomeBook::new();
        missing.insert(EventOutcome::final_score("e2", 98, 105));
        let report = Reconciler::default().verify(&bets, &missing);
        assert_eq!(report.total_checked, 0);
        assert_eq!(report.awaiting_results, 3);
    }

    #[test]
    fn test_verify_does_not_mutate_input() {
        let bets = make_ledger(&make_book(24, 17));
        let before = bets.clone();
        let _ = Reconciler::default().verify(&bets, &make_book(0, 9));
        assert_eq!(bets, before);
    }

    // -- Apply gate --

    #[test]
    fn test_apply_writes_only_selected() {
        let bets = make_ledger(&make_book(24, 17));
        let corrected = make_book(17, 24);
        let reconciler = Reconciler::default();
        let report = reconciler.verify(&bets, &corrected);
        assert_eq!(report.discrepancies.len(), 2);

        let single_key = WagerKey::of(&bets[0]);
        let mut store = MemoryStore::new(bets.clone());
        let applied = reconciler.apply(&mut store, &report.select(&[single_key])).unwrap();
        assert_eq!(applied.corrected_count, 1);
        assert_eq!(applied.audit.len(), 1);
        assert_eq!(store.audit()[0].previous_profit, Some(dec!(150)));

        let stored = store.load_all().unwrap();
        assert_eq!(stored[0].status, BetStatus::Lost);
        assert_eq!(stored[0].profit, Some(dec!(-100)));
        assert_eq!(stored[1], bets[1]);

        let after = reconciler.verify(&stored, &corrected);
        assert_eq!(after.discrepancies.len(), 1);
        assert!(matches!(after.discrepancies[0].wager, WagerKey::Group(_)));
    }

    #[test]
    fn test_apply_group_audits_every_leg() {
        let bets = make_ledger(&make_book(24, 17));
        let corrected = make_book(17, 24);
        let reconciler = Reconciler::default();
        let report = reconciler.verify(&bets, &corrected);
        let group_key = WagerKey::of(&bets[1]);

        let mut store = MemoryStore::new(bets);
        let applied = reconciler.apply(&mut store, &report.select(&[group_key])).unwrap();
        assert_eq!(applied.audit.len(), 2);
        for leg in store.load_wager(group_key).unwrap() {
            assert_eq!(leg.profit, Some(dec!(-50)));
        }
    }

    #[test]
    fn test_apply_skips_stale_records() {
        let bets = make_ledger(&make_book(24, 17));
        let reconciler = Reconciler::default();
        let report = reconciler.verify(&bets, &make_book(17, 24));

        let mut edited = bets.clone();
        edited[0].reason = "edited after verify".into();
        let mut store = MemoryStore::new(edited);
        let applied = reconciler.apply(&mut store, &report.discrepancies).unwrap();
        assert_eq!(applied.corrected_count, 1);
        assert_eq!(applied.stale, vec![WagerKey::of(&bets[0])]);
        assert_eq!(store.load_all().unwrap()[0].status, BetStatus::Won);
    }

    #[test]
    fn test_apply_nothing_selected_touches_nothing() {
        let mut store = MockBetStore::new();
        store.expect_load_wager().never();
        store.expect_write_wager().never();
        store.expect_write_audited().never();
        let applied = Reconciler::default().apply(&mut store, &[]).unwrap();
        assert_eq!(applied.corrected_count, 0);
    }

    #[test]
    fn test_apply_writes_once_per_wager() {
        let bets = make_ledger(&make_book(24, 17));
        let reconciler = Reconciler::default();
        let report = reconciler.verify(&bets, &make_book(17, 24));
        let group_key = WagerKey::of(&bets[1]);
        let selected = report.select(&[group_key]);
        let stored_legs = selected[0].stored_legs.clone();

        let mut store = MockBetStore::new();
        store
            .expect_load_wager()
            .withf(move |key| *key == group_key)
            .times(1)
            .returning(move |_| Ok(stored_legs.clone()));
        store.expect_write_wager().never();
        store
            .expect_write_audited()
            .withf(|legs, entries| {
                legs.len() == 2
                    && legs.iter().all(|b| b.status.is_terminal())
                    && entries.len() == 2
                    && entries.iter().zip(legs).all(|(e, b)| e.bet_id == b.id)
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let applied = reconciler.apply(&mut store, &selected).unwrap();
        assert_eq!(applied.corrected_count, 1);
    }

    #[test]
    fn test_apply_propagates_write_failure() {
        let bets = make_ledger(&make_book(24, 17));
        let reconciler = Reconciler::default();
        let report = reconciler.verify(&bets, &make_book(17, 24));
        let selected = report.select(&[WagerKey::of(&bets[0])]);
        let stored_legs = selected[0].stored_legs.clone();

        let mut store = MockBetStore::new();
        store
            .expect_load_wager()
            .returning(move |_| Ok(stored_legs.clone()));
        store.expect_write_wager().never();
        store
            .expect_write_audited()
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("disk full")));

        let err = reconciler.apply(&mut store, &selected).unwrap_err();
        assert!(format!("{err:#}").contains("disk full"));
    }

    #[test]
    fn test_failed_audited_write_leaves_ledger_untouched() {
        let bets = make_ledger(&make_book(24, 17));
        let reconciler = Reconciler::default();
        let report = reconciler.verify(&bets, &make_book(17, 24));
        let selected = report.select(&[WagerKey::of(&bets[0])]);

        // Loads come from the ledger; the combined write fails.
        let mut memory = MemoryStore::new(bets.clone());
        let mut store = MockBetStore::new();
        let snapshot = memory.clone();
        store
            .expect_load_wager()
            .returning(move |key| snapshot.load_wager(key));
        store.expect_write_wager().never();
        store
            .expect_write_audited()
            .returning(|_, _| Err(anyhow::anyhow!("audit log unavailable")));

        assert!(reconciler.apply(&mut store, &selected).is_err());
        assert_eq!(memory.load_all().unwrap(), bets);
        assert!(memory.audit().is_empty());

        // The same selection against a working store lands legs and audit together.
        let applied = reconciler.apply(&mut memory, &selected).unwrap();
        assert_eq!(applied.corrected_count, 1);
        assert_eq!(memory.audit().len(), 1);
        assert_eq!(memory.load_all().unwrap()[0].status, BetStatus::Lost);
    }
}
