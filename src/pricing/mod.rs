//! Pricing — odds conversion and parlay aggregation.
//!
//! Pure functions only: no logging, no I/O. The settlement engine and the
//! confidence estimators are the callers.

pub mod odds;
pub mod parlay;

pub use odds::{implied_probability, profit, to_decimal};
pub use parlay::{combined_decimal_odds, group_profit, group_status, split_stake};
