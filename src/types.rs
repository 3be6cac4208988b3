//! Shared types for the BETLEDGER engine.
//!
//! These types form the data model used across all modules: bet legs,
//! their selections, finalized event outcomes and the error taxonomy.
//! Pricing, settlement and reconciliation all depend on this module and
//! never on each other's internals.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::pricing::odds;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a bet leg or of a whole wager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetStatus {
    Pending,
    Won,
    Lost,
    Void,
}

impl BetStatus {
    /// All statuses (useful for iteration).
    pub const ALL: &'static [BetStatus] = &[
        BetStatus::Pending,
        BetStatus::Won,
        BetStatus::Lost,
        BetStatus::Void,
    ];

    /// Whether the status is one of the settled outcomes.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BetStatus::Pending)
    }

    /// Rank in the group reduction: lost > pending > won > void.
    pub fn precedence(&self) -> u8 {
        match self {
            BetStatus::Void => 0,
            BetStatus::Won => 1,
            BetStatus::Pending => 2,
            BetStatus::Lost => 3,
        }
    }
}

impl fmt::Display for BetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BetStatus::Pending => write!(f, "pending"),
            BetStatus::Won => write!(f, "won"),
            BetStatus::Lost => write!(f, "lost"),
            BetStatus::Void => write!(f, "void"),
        }
    }
}

/// Parse a stored status string (case-insensitive). "push" is accepted as void.
impl std::str::FromStr for BetStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" | "open" => Ok(BetStatus::Pending),
            "won" | "win" => Ok(BetStatus::Won),
            "lost" | "loss" => Ok(BetStatus::Lost),
            "void" | "push" => Ok(BetStatus::Void),
            _ => Err(anyhow::anyhow!("Unknown bet status: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Market a selection is wagered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketType {
    Moneyline,
    Spread,
    Total,
    Prop,
    /// Anything intake could not map; settles as an ambiguous selection.
    #[serde(other)]
    Unknown,
}

impl fmt::Display for MarketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketType::Moneyline => write!(f, "moneyline"),
            MarketType::Spread => write!(f, "spread"),
            MarketType::Total => write!(f, "total"),
            MarketType::Prop => write!(f, "prop"),
            MarketType::Unknown => write!(f, "unknown"),
        }
    }
}

/// Declared side: a team for moneyline/spread, a direction for total/prop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionSide {
    Home,
    Away,
    Over,
    Under,
}

impl fmt::Display for SelectionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionSide::Home => write!(f, "home"),
            SelectionSide::Away => write!(f, "away"),
            SelectionSide::Over => write!(f, "over"),
            SelectionSide::Under => write!(f, "under"),
        }
    }
}

/// Structured description of what a leg is wagered on.
///
/// Fields are optional because selections arrive from intake as-is; the
/// settlement engine decides whether they map to a gradeable market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub event_id: String,
    pub market: MarketType,
    #[serde(default)]
    pub side: Option<SelectionSide>,
    /// Spread, total or prop line.
    #[serde(default)]
    pub line: Option<f64>,
    /// Player or team the prop statistic belongs to.
    #[serde(default)]
    pub subject: Option<String>,
    /// Prop statistic name, e.g. "points".
    #[serde(default)]
    pub stat: Option<String>,
}

impl Selection {
    pub fn moneyline(event_id: &str, side: SelectionSide) -> Self {
        Self {
            event_id: event_id.to_string(),
            market: MarketType::Moneyline,
            side: Some(side),
            line: None,
            subject: None,
            stat: None,
        }
    }

    pub fn spread(event_id: &str, side: SelectionSide, line: f64) -> Self {
        Self {
            market: MarketType::Spread,
            line: Some(line),
            ..Self::moneyline(event_id, side)
        }
    }

    pub fn total(event_id: &str, side: SelectionSide, line: f64) -> Self {
        Self {
            market: MarketType::Total,
            line: Some(line),
            ..Self::moneyline(event_id, side)
        }
    }

    pub fn prop(event_id: &str, subject: &str, stat: &str, side: SelectionSide, line: f64) -> Self {
        Self {
            event_id: event_id.to_string(),
            market: MarketType::Prop,
            side: Some(side),
            line: Some(line),
            subject: Some(subject.to_string()),
            stat: Some(stat.to_string()),
        }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = self.side.map(|s| s.to_string()).unwrap_or_else(|| "?".into());
        match self.market {
            MarketType::Prop => write!(
                f,
                "[{}] {} {} {} {}",
                self.event_id,
                self.subject.as_deref().unwrap_or("?"),
                self.stat.as_deref().unwrap_or("?"),
                side,
                self.line.map(|l| format!("{l}")).unwrap_or_else(|| "?".into()),
            ),
            MarketType::Moneyline => write!(f, "[{}] moneyline {}", self.event_id, side),
            _ => write!(
                f,
                "[{}] {} {} {}",
                self.event_id,
                self.market,
                side,
                self.line.map(|l| format!("{l:+}")).unwrap_or_else(|| "?".into()),
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Bet
// ---------------------------------------------------------------------------

/// One wagered leg, as stored by the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bet {
    pub id: Uuid,
    /// Shared by every leg of a parlay; `None` for a standalone bet.
    #[serde(default)]
    pub group_id: Option<Uuid>,
    pub selection: Selection,
    /// American odds, the canonical stored representation.
    pub odds: i32,
    /// Amount risked on the whole wager.
    pub original_stake: Decimal,
    /// Amount attributed to this leg.
    pub leg_stake: Decimal,
    pub status: BetStatus,
    #[serde(default)]
    pub result_value: Option<f64>,
    #[serde(default)]
    pub profit: Option<Decimal>,
    /// Free-text notes, preserved verbatim.
    #[serde(default)]
    pub reason: String,
}

impl fmt::Display for Bet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:+} stake=${:.2} [{}]",
            self.selection, self.odds, self.leg_stake, self.status,
        )?;
        if let Some(p) = self.profit {
            write!(f, " pnl=${p:.2}")?;
        }
        Ok(())
    }
}

impl Bet {
    /// Create a pending standalone bet.
    pub fn single(selection: Selection, odds: i32, stake: Decimal) -> Result<Self, LedgerError> {
        odds::validate(odds)?;
        validate_stake(stake)?;
        Ok(Self {
            id: Uuid::new_v4(),
            group_id: None,
            selection,
            odds,
            original_stake: stake,
            leg_stake: stake,
            status: BetStatus::Pending,
            result_value: None,
            profit: None,
            reason: String::new(),
        })
    }

    /// Create the pending legs of a parlay, sharing one freshly generated
    /// group id. Every leg receives an equal share of `stake`.
    pub fn parlay(legs: Vec<(Selection, i32)>, stake: Decimal) -> Result<Vec<Self>, LedgerError> {
        if legs.len() < 2 {
            return Err(LedgerError::LegCount { found: legs.len() });
        }
        validate_stake(stake)?;
        for (_, leg_odds) in &legs {
            odds::validate(*leg_odds)?;
        }

        let group_id = Uuid::new_v4();
        let leg_stake = crate::pricing::parlay::split_stake(stake, legs.len())?;

        Ok(legs
            .into_iter()
            .map(|(selection, leg_odds)| Self {
                id: Uuid::new_v4(),
                group_id: Some(group_id),
                selection,
                odds: leg_odds,
                original_stake: stake,
                leg_stake,
                status: BetStatus::Pending,
                result_value: None,
                profit: None,
                reason: String::new(),
            })
            .collect())
    }

    /// Attach free-text notes.
    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = reason.to_string();
        self
    }

    pub fn is_parlay_leg(&self) -> bool {
        self.group_id.is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.status == BetStatus::Pending
    }

    /// Reset derived fields back to the intake state.
    pub fn reopen(&mut self) {
        self.status = BetStatus::Pending;
        self.result_value = None;
        self.profit = None;
    }
}

/// Stakes must be strictly positive.
fn validate_stake(stake: Decimal) -> Result<(), LedgerError> {
    if stake <= Decimal::ZERO {
        return Err(LedgerError::InvalidStake(stake));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Event outcomes
// ---------------------------------------------------------------------------

/// Final (or in-progress) result of a sporting event, supplied by the
/// results collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventOutcome {
    pub event_id: String,
    pub finalized: bool,
    #[serde(default)]
    pub home_score: Option<u32>,
    #[serde(default)]
    pub away_score: Option<u32>,
    /// subject → stat name → value
    #[serde(default)]
    pub stat_lines: HashMap<String, HashMap<String, f64>>,
}

impl EventOutcome {
    /// A finalized outcome with a final score and no stat lines.
    pub fn final_score(event_id: &str, home_score: u32, away_score: u32) -> Self {
        Self {
            event_id: event_id.to_string(),
            finalized: true,
            home_score: Some(home_score),
            away_score: Some(away_score),
            stat_lines: HashMap::new(),
        }
    }

    /// Builder: record one stat for a subject.
    pub fn with_stat(mut self, subject: &str, stat: &str, value: f64) -> Self {
        self.stat_lines
            .entry(subject.to_string())
            .or_default()
            .insert(stat.to_string(), value);
        self
    }

    /// Look up a stat, case-insensitively on both subject and stat name.
    pub fn stat(&self, subject: &str, stat: &str) -> Option<f64> {
        self.stat_lines
            .iter()
            .find(|(s, _)| s.eq_ignore_ascii_case(subject))
            .and_then(|(_, stats)| {
                stats
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(stat))
                    .map(|(_, v)| *v)
            })
    }

    /// Final score as `(home, away)` if both sides are present.
    pub fn scores(&self) -> Option<(u32, u32)> {
        Some((self.home_score?, self.away_score?))
    }
}

/// Outcomes indexed by event id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<EventOutcome>", into = "Vec<EventOutcome>")]
pub struct OutcomeBook {
    events: HashMap<String, EventOutcome>,
}

impl OutcomeBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the outcome for its event.
    pub fn insert(&mut self, outcome: EventOutcome) {
        self.events.insert(outcome.event_id.clone(), outcome);
    }

    pub fn get(&self, event_id: &str) -> Option<&EventOutcome> {
        self.events.get(event_id)
    }

    /// The outcome for an event, only if it is finalized.
    pub fn finalized(&self, event_id: &str) -> Result<&EventOutcome, LedgerError> {
        match self.events.get(event_id) {
            Some(outcome) if outcome.finalized => Ok(outcome),
            _ => Err(LedgerError::MissingResult {
                event_id: event_id.to_string(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl From<Vec<EventOutcome>> for OutcomeBook {
    fn from(outcomes: Vec<EventOutcome>) -> Self {
        let mut book = OutcomeBook::new();
        for outcome in outcomes {
            book.insert(outcome);
        }
        book
    }
}

impl From<OutcomeBook> for Vec<EventOutcome> {
    fn from(book: OutcomeBook) -> Self {
        let mut outcomes: Vec<EventOutcome> = book.events.into_values().collect();
        outcomes.sort_by(|a, b| a.event_id.cmp(&b.event_id));
        outcomes
    }
}

impl FromIterator<EventOutcome> for OutcomeBook {
    fn from_iter<I: IntoIterator<Item = EventOutcome>>(iter: I) -> Self {
        iter.into_iter().collect::<Vec<_>>().into()
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for BETLEDGER.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum LedgerError {
    #[error("Invalid American odds: {0} (must be <= -100 or >= 100)")]
    InvalidOdds(i32),

    #[error("A parlay needs at least 2 legs, got {found}")]
    LegCount { found: usize },

    #[error("Event {event_id} has no finalized result")]
    MissingResult { event_id: String },

    #[error("Ambiguous selection on bet {bet_id}: {reason}")]
    AmbiguousSelection { bet_id: Uuid, reason: String },

    #[error("Data integrity violation ({wager}): {reason}")]
    DataIntegrity { wager: String, reason: String },

    #[error("Amount is not representable as money: {0}")]
    NonFiniteAmount(f64),

    #[error("Amount overflows the money range: {0}")]
    AmountOverflow(String),

    #[error("Stake must be positive, got {0}")]
    InvalidStake(Decimal),
}

impl LedgerError {
    /// Whether retrying on a later settlement pass can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::MissingResult { .. })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
