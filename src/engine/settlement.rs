//! Settlement engine — grades legs against finalized outcomes and rolls
//! parlay legs up into one group result.
//!
//! A leg moves `pending → won | lost | void` exactly once here. Grading is
//! pure: `settle` reads a wager and the outcome book and returns a
//! `Settlement`; writing it back is the caller's job (`Settlement::apply_to`
//! plus an atomic `BetStore::write_audited` carrying `forced_void_audit`).

use chrono::Utc;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::wager::{Group, Wager, WagerKey};
use crate::pricing::{odds, parlay};
use crate::storage::AuditEntry;
use crate::types::{Bet, BetStatus, EventOutcome, LedgerError, MarketType, OutcomeBook, SelectionSide};

/// Distance from the line treated as landing exactly on it.
const LINE_TOLERANCE: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Settlement engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    /// Decimal places settled profits are rounded to.
    pub currency_dp: u32,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self { currency_dp: 2 }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Grade of one leg before any money is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct LegGrade {
    pub status: BetStatus,
    /// Observed value the selection was judged on (margin, total or stat).
    pub result_value: Option<f64>,
}

/// Settled state of one leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegSettlement {
    pub bet_id: Uuid,
    pub status: BetStatus,
    pub result_value: Option<f64>,
    /// For a parlay leg this is the group figure, not a per-leg share.
    pub profit: Decimal,
    /// Set when the leg was forced to void.
    #[serde(default)]
    pub note: Option<String>,
}

/// Settled state of one wager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub key: WagerKey,
    pub status: BetStatus,
    pub profit: Decimal,
    /// Payout multiplier actually applied (void legs removed).
    pub decimal_odds: f64,
    pub legs: Vec<LegSettlement>,
}

impl Settlement {
    pub fn leg(&self, bet_id: Uuid) -> Option<&LegSettlement> {
        self.legs.iter().find(|l| l.bet_id == bet_id)
    }

    /// Legs forced to void because their selection could not be graded.
    pub fn forced_voids(&self) -> usize {
        self.legs.iter().filter(|l| l.note.is_some()).count()
    }

    /// Audit entries for legs forced to void, taken against their stored
    /// state. Call before `apply_to`.
    pub fn forced_void_audit(&self, stored: &[Bet]) -> Vec<AuditEntry> {
        let recorded_at = Utc::now();
        stored
            .iter()
            .filter_map(|bet| {
                let leg = self.leg(bet.id)?;
                let note = leg.note.as_ref()?;
                Some(AuditEntry {
                    wager: self.key,
                    bet_id: bet.id,
                    previous_status: bet.status,
                    previous_profit: bet.profit,
                    new_status: leg.status,
                    new_profit: Some(leg.profit),
                    reason: format!("forced void: {note}"),
                    recorded_at,
                })
            })
            .collect()
    }

    /// Write the settled fields onto the matching stored legs.
    ///
    /// Returns the number of legs updated. `reason` is left untouched.
    pub fn apply_to(&self, bets: &mut [Bet]) -> usize {
        let mut updated = 0;
        for bet in bets.iter_mut() {
            if let Some(leg) = self.leg(bet.id) {
                bet.status = leg.status;
                bet.result_value = leg.result_value;
                bet.profit = Some(leg.profit);
                updated += 1;
            }
        }
        updated
    }
}

/// Outcome of a settlement pass over many wagers.
#[derive(Debug, Clone, Default)]
pub struct BatchSettlement {
    pub settled: Vec<Settlement>,
    /// Wagers waiting on an event that is not finalized yet.
    pub deferred: Vec<(WagerKey, LedgerError)>,
    /// Wagers whose grading failed outright.
    pub failed: Vec<(WagerKey, LedgerError)>,
    /// Wagers that were already settled and left alone.
    pub skipped: usize,
    /// Wagers whose grading task did not complete.
    pub aborted: Vec<WagerKey>,
}

impl BatchSettlement {
    fn record(&mut self, key: WagerKey, result: Option<Result<Settlement, LedgerError>>) {
        match result {
            None => self.skipped += 1,
            Some(Ok(settlement)) => self.settled.push(settlement),
            Some(Err(e)) if e.is_retryable() => self.deferred.push((key, e)),
            Some(Err(e)) => {
                warn!(wager = %key, error = %e, "Wager could not be settled");
                self.failed.push((key, e));
            }
        }
    }

    pub fn total_profit(&self) -> Decimal {
        self.settled
            .iter()
            .fold(Decimal::ZERO, |acc, s| acc.saturating_add(s.profit))
    }

    fn log_summary(&self) {
        info!(
            settled = self.settled.len(),
            deferred = self.deferred.len(),
            failed = self.failed.len(),
            skipped = self.skipped,
            aborted = self.aborted.len(),
            profit = format!("${:.2}", self.total_profit()),
            "Settlement pass complete"
        );
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct SettlementEngine {
    config: SettlementConfig,
}

impl SettlementEngine {
    pub fn new(config: SettlementConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    /// Grade one leg against its event's outcome.
    ///
    /// Fails with `MissingResult` when the outcome is not final (or has no
    /// score for a score-based market) and with `AmbiguousSelection` when
    /// the selection does not map to a gradeable market.
    pub fn classify(&self, bet: &Bet, outcome: &EventOutcome) -> Result<LegGrade, LedgerError> {
        let sel = &bet.selection;
        let ambiguous = |reason: &str| LedgerError::AmbiguousSelection {
            bet_id: bet.id,
            reason: reason.to_string(),
        };

        if outcome.event_id != sel.event_id {
            return Err(ambiguous("outcome belongs to a different event"));
        }
        if !outcome.finalized {
            return Err(LedgerError::MissingResult {
                event_id: outcome.event_id.clone(),
            });
        }

        let line = || match sel.line {
            Some(l) if l.is_finite() => Ok(l),
            Some(_) => Err(ambiguous("line is not a finite number")),
            None => Err(ambiguous("market requires a line")),
        };
        let scores = || {
            outcome.scores().ok_or_else(|| LedgerError::MissingResult {
                event_id: outcome.event_id.clone(),
            })
        };

        match (sel.market, sel.side) {
            (MarketType::Moneyline, Some(side @ (SelectionSide::Home | SelectionSide::Away))) => {
                let margin = side_margin(scores()?, side);
                Ok(grade(margin, margin))
            }
            (MarketType::Spread, Some(side @ (SelectionSide::Home | SelectionSide::Away))) => {
                let line = line()?;
                let margin = side_margin(scores()?, side);
                Ok(grade(margin, margin + line))
            }
            (MarketType::Total, Some(side @ (SelectionSide::Over | SelectionSide::Under))) => {
                let line = line()?;
                let (home, away) = scores()?;
                let total = f64::from(home) + f64::from(away);
                Ok(grade(total, directional(total - line, side)))
            }
            (MarketType::Prop, Some(side @ (SelectionSide::Over | SelectionSide::Under))) => {
                let line = line()?;
                let (subject, stat) = match (sel.subject.as_deref(), sel.stat.as_deref()) {
                    (Some(subject), Some(stat)) => (subject, stat),
                    _ => return Err(ambiguous("prop requires a subject and a stat")),
                };
                let value = outcome
                    .stat(subject, stat)
                    .ok_or_else(|| ambiguous(&format!("no {stat} recorded for {subject}")))?;
                if !value.is_finite() {
                    return Err(ambiguous(&format!("{stat} for {subject} is not a number")));
                }
                Ok(grade(value, directional(value - line, side)))
            }
            (MarketType::Unknown, _) => Err(ambiguous("unrecognised market")),
            (market, None) => Err(ambiguous(&format!("{market} selection has no side"))),
            (market, Some(side)) => Err(ambiguous(&format!("side {side} is not valid for {market}"))),
        }
    }

    /// Grade a whole wager. Every referenced event must be finalized.
    ///
    /// Ambiguous legs are forced to void and carry a note; any other error
    /// aborts the wager.
    pub fn settle(&self, wager: &Wager, outcomes: &OutcomeBook) -> Result<Settlement, LedgerError> {
        for event_id in wager.event_ids() {
            outcomes.finalized(event_id)?;
        }

        let mut graded = Vec::with_capacity(wager.legs().len());
        for leg in wager.legs() {
            let outcome = outcomes.finalized(&leg.selection.event_id)?;
            let (grade, note) = match self.classify(leg, outcome) {
                Ok(grade) => (grade, None),
                Err(e @ LedgerError::AmbiguousSelection { .. }) => {
                    warn!(
                        wager = %wager.key(),
                        bet_id = %leg.id,
                        selection = %leg.selection,
                        error = %e,
                        "Forcing ambiguous leg to void"
                    );
                    let grade = LegGrade {
                        status: BetStatus::Void,
                        result_value: None,
                    };
                    (grade, Some(e.to_string()))
                }
                Err(e) => return Err(e),
            };
            debug!(
                bet_id = %leg.id,
                selection = %leg.selection,
                status = %grade.status,
                result_value = ?grade.result_value,
                "Leg graded"
            );
            graded.push((leg, grade, note));
        }

        let settlement = match wager {
            Wager::Single(bet) => {
                let (_, grade, note) = graded.remove(0);
                let profit = self.round(odds::profit(bet.leg_stake, bet.odds, grade.status)?);
                Settlement {
                    key: wager.key(),
                    status: grade.status,
                    profit,
                    decimal_odds: odds::to_decimal(bet.odds)?,
                    legs: vec![LegSettlement {
                        bet_id: bet.id,
                        status: grade.status,
                        result_value: grade.result_value,
                        profit,
                        note,
                    }],
                }
            }
            Wager::Parlay(group) => self.roll_up(group, graded)?,
        };

        debug!(
            wager = %settlement.key,
            status = %settlement.status,
            profit = format!("${:.2}", settlement.profit),
            "Wager settled"
        );
        Ok(settlement)
    }

    fn roll_up(
        &self,
        group: &Group,
        graded: Vec<(&Bet, LegGrade, Option<String>)>,
    ) -> Result<Settlement, LedgerError> {
        let statuses: Vec<BetStatus> = graded.iter().map(|(_, g, _)| g.status).collect();
        let status = parlay::group_status(&statuses);
        let priced: Vec<(i32, BetStatus)> = graded.iter().map(|(b, g, _)| (b.odds, g.status)).collect();
        let decimal_odds = parlay::effective_decimal_odds(&priced)?;
        let profit = self.round(parlay::group_profit(group.original_stake(), decimal_odds, status)?);

        let legs = graded
            .into_iter()
            .map(|(bet, grade, note)| LegSettlement {
                bet_id: bet.id,
                status: grade.status,
                result_value: grade.result_value,
                profit,
                note,
            })
            .collect();

        Ok(Settlement {
            key: WagerKey::Group(group.id()),
            status,
            profit,
            decimal_odds,
            legs,
        })
    }

    /// Settle every pending wager whose events are all finalized.
    pub fn settle_all(&self, wagers: &[Wager], outcomes: &OutcomeBook) -> BatchSettlement {
        let mut batch = BatchSettlement::default();
        for wager in wagers {
            let result = wager.is_pending().then(|| self.settle(wager, outcomes));
            batch.record(wager.key(), result);
        }
        batch.log_summary();
        batch
    }

    /// Like `settle_all`, with one blocking task per wager. Results come
    /// back in input order.
    pub async fn settle_all_concurrent(&self, wagers: Vec<Wager>, outcomes: Arc<OutcomeBook>) -> BatchSettlement {
        let tasks = wagers.into_iter().map(|wager| {
            let engine = self.clone();
            let outcomes = Arc::clone(&outcomes);
            let key = wager.key();
            let handle = tokio::task::spawn_blocking(move || {
                wager.is_pending().then(|| engine.settle(&wager, &outcomes))
            });
            async move { (key, handle.await) }
        });

        let mut batch = BatchSettlement::default();
        for (key, joined) in futures::future::join_all(tasks).await {
            match joined {
                Ok(result) => batch.record(key, result),
                Err(e) => {
                    warn!(wager = %key, error = %e, "Settlement task did not complete");
                    batch.aborted.push(key);
                }
            }
        }
        batch.log_summary();
        batch
    }

    fn round(&self, amount: Decimal) -> Decimal {
        amount.round_dp_with_strategy(self.config.currency_dp, RoundingStrategy::MidpointAwayFromZero)
    }
}

/// Score margin from the declared side's point of view.
fn side_margin((home, away): (u32, u32), side: SelectionSide) -> f64 {
    let margin = f64::from(home) - f64::from(away);
    match side {
        SelectionSide::Away => -margin,
        _ => margin,
    }
}

/// Flip a signed distance so that positive always favours the selection.
fn directional(diff: f64, side: SelectionSide) -> f64 {
    match side {
        SelectionSide::Under => -diff,
        _ => diff,
    }
}

/// Positive `edge` wins, negative loses, on the line is a push.
fn grade(result_value: f64, edge: f64) -> LegGrade {
    let status = if edge.abs() <= LINE_TOLERANCE {
        BetStatus::Void
    } else if edge > 0.0 {
        BetStatus::Won
    } else {
        BetStatus::Lost
    };
    LegGrade {
        status,
        result_value: Some(result_value),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
