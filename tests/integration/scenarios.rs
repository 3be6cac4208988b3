//! Settlement scenarios against finalized outcomes.

use betledger::engine::{assemble, Accountant, SettlementEngine, Wager, WagerKey};
use betledger::pricing::{combined_decimal_odds, group_status, implied_probability, profit, split_stake, to_decimal};
use betledger::types::{Bet, BetStatus, EventOutcome, LedgerError, OutcomeBook, Selection, SelectionSide};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::common::{make_graded_ledger, make_ledger, make_outcomes};

fn settle_one(bets: &[Bet], outcomes: &OutcomeBook) -> betledger::engine::Settlement {
    let wager = assemble(bets).wagers.remove(0);
    SettlementEngine::default().settle(&wager, outcomes).unwrap()
}

#[test]
fn test_scenario_a_single_plus_150_won() {
    let bet = Bet::single(Selection::moneyline("nfl-kc-buf", SelectionSide::Home), 150, dec!(100)).unwrap();
    let s = settle_one(&[bet], &make_outcomes());
    assert_eq!(s.status, BetStatus::Won);
    assert_eq!(s.profit, dec!(150.0));
}

#[test]
fn test_scenario_b_two_leg_parlay() {
    let legs = vec![
        (Selection::moneyline("nfl-kc-buf", SelectionSide::Home), -150),
        (Selection::moneyline("nba-bos-nyk", SelectionSide::Away), 120),
    ];
    let bets = Bet::parlay(legs.clone(), dec!(50)).unwrap();
    let s = settle_one(&bets, &make_outcomes());
    assert_eq!(s.status, BetStatus::Won);
    assert!((s.decimal_odds - 3.667).abs() < 1e-3);
    assert_eq!(s.profit, dec!(133.33));

    // Same parlay, first leg flipped to the losing side.
    let mut losing = legs;
    losing[0].0 = Selection::moneyline("nfl-kc-buf", SelectionSide::Away);
    let bets = Bet::parlay(losing, dec!(50)).unwrap();
    let s = settle_one(&bets, &make_outcomes());
    assert_eq!(s.status, BetStatus::Lost);
    assert_eq!(s.profit, dec!(-50));
}

#[test]
fn test_scenario_d_prop_on_the_line_is_void() {
    for (odds, stake) in [(-125, dec!(40)), (300, dec!(1000)), (-1000, dec!(0.50))] {
        let bet = Bet::single(
            Selection::prop("nba-bos-nyk", "Jayson Tatum", "rebounds", SelectionSide::Over, 9.0),
            odds,
            stake,
        )
        .unwrap();
        let s = settle_one(&[bet], &make_outcomes());
        assert_eq!(s.status, BetStatus::Void);
        assert_eq!(s.profit, Decimal::ZERO);
    }
}

#[test]
fn test_full_ledger_settles_and_summarises() {
    let outcomes = make_outcomes();
    let bets = make_graded_ledger(&outcomes);
    assert!(bets.iter().all(|b| b.status.is_terminal()));

    let assembly = assemble(&bets);
    assert!(assembly.violations.is_empty());
    let parlay = assembly
        .wagers
        .iter()
        .find(|w| matches!(w, Wager::Parlay(_)))
        .unwrap();
    // Tied hockey leg pushes out of the parlay.
    assert_eq!(parlay.stored_status(), BetStatus::Won);
    assert_eq!(parlay.stored_profit(), Some(dec!(160)));

    let summary = Accountant::summarize(&assembly.wagers);
    assert_eq!((summary.won, summary.lost, summary.void, summary.pending), (3, 0, 1, 0));
    assert_eq!(summary.profit, dec!(360));
    assert_eq!(summary.settled_stake, dec!(255));
}

#[test]
fn test_settlement_is_one_way() {
    let outcomes = make_outcomes();
    let bets = make_graded_ledger(&outcomes);
    let batch = SettlementEngine::default().settle_all(&assemble(&bets).wagers, &outcomes);
    assert!(batch.settled.is_empty());
    assert_eq!(batch.skipped, 4);
}

#[test]
fn test_unfinished_event_defers_whole_parlay() {
    let mut outcomes = make_outcomes();
    let mut live = EventOutcome::final_score("nhl-tor-mtl", 2, 1);
    live.finalized = false;
    outcomes.insert(live);

    let bets = make_ledger();
    let batch = SettlementEngine::default().settle_all(&assemble(&bets).wagers, &outcomes);
    assert_eq!(batch.settled.len(), 3);
    assert_eq!(batch.deferred.len(), 1);
    let (key, err) = &batch.deferred[0];
    assert!(matches!(key, WagerKey::Group(_)));
    assert_eq!(err, &LedgerError::MissingResult { event_id: "nhl-tor-mtl".into() });
}

#[tokio::test]
async fn test_concurrent_batch_preserves_order() {
    let outcomes = std::sync::Arc::new(make_outcomes());
    let wagers = assemble(&make_ledger()).wagers;
    let keys: Vec<WagerKey> = wagers.iter().map(Wager::key).collect();
    let batch = SettlementEngine::default().settle_all_concurrent(wagers, outcomes).await;
    let settled: Vec<WagerKey> = batch.settled.iter().map(|s| s.key).collect();
    assert_eq!(settled, keys);
}

// -- Pricing properties --

#[test]
fn test_implied_probability_inverse_of_decimal() {
    for o in (-2000..=-100).step_by(7).chain((100..=2000).step_by(7)) {
        let p = implied_probability(o).unwrap();
        assert!((p - 1.0 / to_decimal(o).unwrap()).abs() < 1e-6, "odds {o}");
    }
}

#[test]
fn test_profit_signs() {
    for o in [-500, -110, -100, 100, 120, 450] {
        for s in [dec!(0.01), dec!(10), dec!(2500)] {
            assert!(profit(s, o, BetStatus::Won).unwrap() > Decimal::ZERO);
            assert_eq!(profit(s, o, BetStatus::Lost).unwrap(), -s);
            assert_eq!(profit(s, o, BetStatus::Void).unwrap(), Decimal::ZERO);
        }
    }
}

#[test]
fn test_parlay_helpers() {
    let combined = combined_decimal_odds(&[-150, 120]).unwrap();
    assert!((combined - to_decimal(-150).unwrap() * to_decimal(120).unwrap()).abs() < 1e-12);

    let share = split_stake(dec!(100), 4).unwrap();
    assert_eq!(share, dec!(25));
    assert_eq!(share * Decimal::from(4), dec!(100));

    use BetStatus::{Lost, Pending, Won};
    assert_eq!(group_status(&[Won, Pending, Lost]), Lost);
    assert_eq!(combined_decimal_odds(&[110]), Err(LedgerError::LegCount { found: 1 }));
}
