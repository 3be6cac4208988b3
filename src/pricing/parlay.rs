//! Parlay aggregation.
//!
//! Combines per-leg prices into one multiplier, splits the wager stake
//! evenly across legs and reduces leg statuses to a single group status.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;

use super::odds;
use crate::types::{BetStatus, LedgerError};

/// Minimum number of legs for a parlay.
pub const MIN_LEGS: usize = 2;

/// Product of the legs' decimal odds. Requires at least two legs.
pub fn combined_decimal_odds(leg_odds: &[i32]) -> Result<f64, LedgerError> {
    if leg_odds.len() < MIN_LEGS {
        return Err(LedgerError::LegCount {
            found: leg_odds.len(),
        });
    }
    leg_odds
        .iter()
        .try_fold(1.0_f64, |acc, &o| Ok(acc * odds::to_decimal(o)?))
}

/// Payout multiplier once void (pushed) legs are dropped from the parlay.
///
/// Returns 1.0 when every leg is void: the stake simply comes back.
pub fn effective_decimal_odds(legs: &[(i32, BetStatus)]) -> Result<f64, LedgerError> {
    legs.iter()
        .filter(|(_, status)| *status != BetStatus::Void)
        .try_fold(1.0_f64, |acc, (o, _)| Ok(acc * odds::to_decimal(*o)?))
}

/// Equal share of the wager stake per leg, independent of each leg's odds.
pub fn split_stake(original_stake: Decimal, leg_count: usize) -> Result<Decimal, LedgerError> {
    if leg_count == 0 {
        return Err(LedgerError::LegCount { found: 0 });
    }
    Ok(original_stake / Decimal::from(leg_count))
}

/// Reduce leg statuses to the group status.
///
/// Any lost leg loses the group, even with legs still pending; otherwise
/// any pending leg keeps it pending; otherwise a group with at least one
/// won leg is won. A group whose legs are all void is void.
pub fn group_status(leg_statuses: &[BetStatus]) -> BetStatus {
    leg_statuses
        .iter()
        .copied()
        .fold(BetStatus::Void, |acc, s| {
            if s.precedence() > acc.precedence() {
                s
            } else {
                acc
            }
        })
}

/// Signed monetary result of a whole group.
pub fn group_profit(
    original_stake: Decimal,
    combined_decimal_odds: f64,
    status: BetStatus,
) -> Result<Decimal, LedgerError> {
    match status {
        BetStatus::Won => {
            let net = combined_decimal_odds - 1.0;
            let multiplier = Decimal::from_f64(net)
                .filter(|_| net.is_finite())
                .ok_or(LedgerError::NonFiniteAmount(net))?;
            original_stake.checked_mul(multiplier).ok_or_else(|| {
                LedgerError::AmountOverflow(format!("{original_stake} at {combined_decimal_odds}x"))
            })
        }
        BetStatus::Lost => Ok(-original_stake),
        BetStatus::Pending | BetStatus::Void => Ok(Decimal::ZERO),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
