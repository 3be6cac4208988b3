//! Accountant — ledger P&L and record.
//!
//! Summarises assembled wagers for the analytics side: counts per status,
//! money staked and won, ROI and win rate. A parlay is one wager here; its
//! group profit is stored on every leg but counted once.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

use super::wager::Wager;
use crate::types::BetStatus;

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub wagers: usize,
    pub parlays: usize,
    pub won: usize,
    pub lost: usize,
    pub void: usize,
    pub pending: usize,
    /// Stake of settled wagers, voids included.
    pub settled_stake: Decimal,
    /// Stake still riding on pending wagers.
    pub open_stake: Decimal,
    pub profit: Decimal,
}

impl LedgerSummary {
    /// Profit over settled stake; `None` before anything has settled.
    pub fn roi(&self) -> Option<f64> {
        if self.settled_stake.is_zero() {
            return None;
        }
        self.profit.checked_div(self.settled_stake)?.to_f64()
    }

    /// Wins over decided (won + lost) wagers; voids do not count.
    pub fn win_rate(&self) -> Option<f64> {
        let decided = self.won + self.lost;
        if decided == 0 {
            return None;
        }
        Some(self.won as f64 / decided as f64)
    }
}

impl fmt::Display for LedgerSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{} ({} pending) | staked ${:.2} | pnl ${:.2}",
            self.won, self.lost, self.void, self.pending, self.settled_stake, self.profit,
        )?;
        if let Some(roi) = self.roi() {
            write!(f, " | roi {:+.1}%", roi * 100.0)?;
        }
        if let Some(rate) = self.win_rate() {
            write!(f, " | win {:.1}%", rate * 100.0)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Accountant
// ---------------------------------------------------------------------------

pub struct Accountant;

impl Accountant {
    pub fn summarize(wagers: &[Wager]) -> LedgerSummary {
        let mut summary = LedgerSummary::default();

        for wager in wagers {
            summary.wagers += 1;
            if matches!(wager, Wager::Parlay(_)) {
                summary.parlays += 1;
            }

            let stake = wager.original_stake();
            match wager.stored_status() {
                BetStatus::Pending => {
                    summary.pending += 1;
                    summary.open_stake = summary.open_stake.saturating_add(stake);
                    continue;
                }
                BetStatus::Won => summary.won += 1,
                BetStatus::Lost => summary.lost += 1,
                BetStatus::Void => summary.void += 1,
            }
            // Totals saturate at the Decimal range.
            summary.settled_stake = summary.settled_stake.saturating_add(stake);
            summary.profit = summary
                .profit
                .saturating_add(wager.stored_profit().unwrap_or(Decimal::ZERO));
        }

        info!(
            wagers = summary.wagers,
            record = format!("{}-{}-{}", summary.won, summary.lost, summary.void),
            pending = summary.pending,
            pnl = format!("${:.2}", summary.profit),
            "Ledger summarised"
        );
        summary
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
