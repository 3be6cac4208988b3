//! Odds conversion.
//!
//! American odds are the stored representation; decimal odds and implied
//! probabilities are derived from them. Single-bet profit is computed in
//! `Decimal` so whole-cent stakes never pick up float drift.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::types::{BetStatus, LedgerError};

/// Reject values in the open interval (-100, 100).
pub fn validate(american: i32) -> Result<(), LedgerError> {
    if american > -100 && american < 100 {
        return Err(LedgerError::InvalidOdds(american));
    }
    Ok(())
}

/// Convert American odds to decimal odds (total payout per unit staked).
///
/// +150 → 2.5, -150 → 1.667, ±100 → 2.0.
pub fn to_decimal(american: i32) -> Result<f64, LedgerError> {
    validate(american)?;
    let a = f64::from(american);
    if american > 0 {
        Ok(1.0 + a / 100.0)
    } else {
        Ok(1.0 + 100.0 / a.abs())
    }
}

/// Probability implied by the price alone, vig included.
pub fn implied_probability(american: i32) -> Result<f64, LedgerError> {
    validate(american)?;
    let a = f64::from(american);
    if american > 0 {
        Ok(100.0 / (a + 100.0))
    } else {
        Ok(a.abs() / (a.abs() + 100.0))
    }
}

/// Signed monetary result of a single outcome.
///
/// Won pays the odds on `stake`, lost forfeits it, void returns it (0).
/// A pending outcome has no result yet and also yields 0. A payout past
/// the `Decimal` range is an `AmountOverflow` error.
pub fn profit(stake: Decimal, american: i32, outcome: BetStatus) -> Result<Decimal, LedgerError> {
    validate(american)?;
    let overflow = || LedgerError::AmountOverflow(format!("{stake} at {american:+}"));
    let result = match outcome {
        BetStatus::Won if american > 0 => stake
            .checked_mul(Decimal::from(american))
            .and_then(|x| x.checked_div(dec!(100)))
            .ok_or_else(overflow)?,
        BetStatus::Won => stake
            .checked_mul(dec!(100))
            .and_then(|x| x.checked_div(Decimal::from(american.unsigned_abs())))
            .ok_or_else(overflow)?,
        BetStatus::Lost => -stake,
        BetStatus::Void | BetStatus::Pending => Decimal::ZERO,
    };
    Ok(result)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
