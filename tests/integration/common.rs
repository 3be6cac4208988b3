//! Shared fixtures.

use betledger::engine::{assemble, SettlementEngine};
use betledger::types::{Bet, EventOutcome, OutcomeBook, Selection, SelectionSide};
use rust_decimal_macros::dec;

/// Final scores and stat lines for one night of games.
pub fn make_outcomes() -> OutcomeBook {
    vec![
        EventOutcome::final_score("nfl-kc-buf", 27, 24),
        EventOutcome::final_score("nba-bos-nyk", 112, 118)
            .with_stat("Jalen Brunson", "points", 31.0)
            .with_stat("Jayson Tatum", "rebounds", 9.0),
        EventOutcome::final_score("nhl-tor-mtl", 3, 3),
    ]
    .into()
}

/// A pending ledger: two singles, one prop and one three-leg parlay.
pub fn make_ledger() -> Vec<Bet> {
    let mut bets = vec![
        Bet::single(Selection::moneyline("nfl-kc-buf", SelectionSide::Home), 150, dec!(100))
            .unwrap()
            .with_reason("form 61% | market 57%"),
        Bet::single(Selection::spread("nba-bos-nyk", SelectionSide::Away, 4.5), -110, dec!(55)).unwrap(),
        Bet::single(
            Selection::prop("nba-bos-nyk", "Jayson Tatum", "rebounds", SelectionSide::Over, 9.0),
            -125,
            dec!(40),
        )
        .unwrap(),
    ];
    bets.extend(
        Bet::parlay(
            vec![
                (Selection::moneyline("nfl-kc-buf", SelectionSide::Home), -150),
                (Selection::moneyline("nba-bos-nyk", SelectionSide::Away), 120),
                (Selection::moneyline("nhl-tor-mtl", SelectionSide::Home), 105),
            ],
            dec!(60),
        )
        .unwrap(),
    );
    bets
}

/// `make_ledger` graded against `outcomes`, the way the CLI would.
pub fn make_graded_ledger(outcomes: &OutcomeBook) -> Vec<Bet> {
    let mut bets = make_ledger();
    let engine = SettlementEngine::default();
    let batch = engine.settle_all(&assemble(&bets).wagers, outcomes);
    for settlement in &batch.settled {
        settlement.apply_to(&mut bets);
    }
    bets
}
