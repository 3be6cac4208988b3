//! Wager assembly.
//!
//! Stored bets are flat legs linked by `group_id`. This module turns them
//! into explicit aggregates (`Wager::Single` / `Wager::Parlay`) once, and
//! reports every structural violation it finds instead of guessing.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::pricing::{odds, parlay};
use crate::types::{Bet, BetStatus, LedgerError};

/// Slack allowed between a stored leg stake and the exact equal share.
/// Stakes that do not divide evenly lose precision in float-encoded storage.
const STAKE_TOLERANCE: Decimal = rust_decimal_macros::dec!(0.000001);

// ---------------------------------------------------------------------------
// Wager key
// ---------------------------------------------------------------------------

/// Identifies a settlement unit: a standalone bet or a whole group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum WagerKey {
    Single(Uuid),
    Group(Uuid),
}

impl WagerKey {
    /// The unit a stored leg belongs to.
    pub fn of(bet: &Bet) -> Self {
        match bet.group_id {
            Some(gid) => WagerKey::Group(gid),
            None => WagerKey::Single(bet.id),
        }
    }

    /// Whether `bet` is part of this unit.
    pub fn contains(&self, bet: &Bet) -> bool {
        WagerKey::of(bet) == *self
    }
}

impl fmt::Display for WagerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WagerKey::Single(id) => write!(f, "single:{id}"),
            WagerKey::Group(id) => write!(f, "group:{id}"),
        }
    }
}

/// Parse `single:<uuid>` or `group:<uuid>`.
impl std::str::FromStr for WagerKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("Wager key must look like kind:uuid, got {s}"))?;
        let id: Uuid = id.trim().parse()?;
        match kind.trim().to_lowercase().as_str() {
            "single" => Ok(WagerKey::Single(id)),
            "group" | "parlay" => Ok(WagerKey::Group(id)),
            other => Err(anyhow::anyhow!("Unknown wager kind: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Group
// ---------------------------------------------------------------------------

/// A parlay: an ordered list of legs sharing one group id.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    id: Uuid,
    legs: Vec<Bet>,
}

impl Group {
    /// Build a group, enforcing the stored-state invariants.
    pub fn new(legs: Vec<Bet>) -> Result<Self, LedgerError> {
        let id = legs
            .first()
            .and_then(|b| b.group_id)
            .ok_or(LedgerError::LegCount { found: legs.len() })?;
        let key = WagerKey::Group(id);

        if legs.len() < parlay::MIN_LEGS {
            return Err(integrity(key, format!("group has {} leg(s), needs at least 2", legs.len())));
        }
        if let Some(stray) = legs.iter().find(|b| b.group_id != Some(id)) {
            return Err(integrity(key, format!("leg {} belongs to a different group", stray.id)));
        }

        let original_stake = legs[0].original_stake;
        if legs.iter().any(|b| b.original_stake != original_stake) {
            return Err(integrity(key, "original_stake differs across legs".to_string()));
        }
        let expected_leg_stake = parlay::split_stake(original_stake, legs.len())?;
        if let Some(b) = legs
            .iter()
            .find(|b| {
                b.leg_stake
                    .checked_sub(expected_leg_stake)
                    .map_or(true, |d| d.abs() > STAKE_TOLERANCE)
            })
        {
            return Err(integrity(
                key,
                format!(
                    "leg {} has leg_stake {} but {} / {} = {}",
                    b.id,
                    b.leg_stake,
                    original_stake,
                    legs.len(),
                    expected_leg_stake
                ),
            ));
        }

        for leg in &legs {
            check_leg(key, leg)?;
        }

        let pending = legs.iter().filter(|b| b.is_pending()).count();
        if pending != 0 && pending != legs.len() {
            return Err(integrity(
                key,
                format!("partially settled: {pending} of {} legs pending", legs.len()),
            ));
        }
        if pending == 0 {
            let first = legs[0].profit;
            if legs.iter().any(|b| b.profit != first) {
                return Err(integrity(key, "legs carry different group profit figures".to_string()));
            }
        }

        Ok(Self { id, legs })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn legs(&self) -> &[Bet] {
        &self.legs
    }

    pub fn into_legs(self) -> Vec<Bet> {
        self.legs
    }

    pub fn original_stake(&self) -> Decimal {
        self.legs[0].original_stake
    }

    pub fn leg_odds(&self) -> Vec<i32> {
        self.legs.iter().map(|b| b.odds).collect()
    }
}

// ---------------------------------------------------------------------------
// Wager
// ---------------------------------------------------------------------------

/// One settlement unit.
#[derive(Debug, Clone, PartialEq)]
pub enum Wager {
    Single(Bet),
    Parlay(Group),
}

impl Wager {
    /// Build a standalone wager, enforcing the stored-state invariants.
    pub fn single(bet: Bet) -> Result<Self, LedgerError> {
        let key = WagerKey::of(&bet);
        if bet.group_id.is_some() {
            return Err(integrity(key, "standalone bet carries a group id".to_string()));
        }
        if bet.leg_stake != bet.original_stake {
            return Err(integrity(
                key,
                format!("leg_stake {} differs from original_stake {}", bet.leg_stake, bet.original_stake),
            ));
        }
        check_leg(key, &bet)?;
        Ok(Wager::Single(bet))
    }

    pub fn key(&self) -> WagerKey {
        match self {
            Wager::Single(bet) => WagerKey::Single(bet.id),
            Wager::Parlay(group) => WagerKey::Group(group.id),
        }
    }

    pub fn legs(&self) -> &[Bet] {
        match self {
            Wager::Single(bet) => std::slice::from_ref(bet),
            Wager::Parlay(group) => group.legs(),
        }
    }

    pub fn original_stake(&self) -> Decimal {
        match self {
            Wager::Single(bet) => bet.original_stake,
            Wager::Parlay(group) => group.original_stake(),
        }
    }

    /// Status as currently stored (group rule applied across legs).
    pub fn stored_status(&self) -> BetStatus {
        match self {
            Wager::Single(bet) => bet.status,
            Wager::Parlay(group) => {
                let statuses: Vec<BetStatus> = group.legs.iter().map(|b| b.status).collect();
                parlay::group_status(&statuses)
            }
        }
    }

    /// Profit as currently stored; a group's figure is recorded on every leg.
    pub fn stored_profit(&self) -> Option<Decimal> {
        self.legs().first().and_then(|b| b.profit)
    }

    pub fn is_pending(&self) -> bool {
        self.legs().iter().all(Bet::is_pending)
    }

    /// Distinct events referenced by the legs, in leg order.
    pub fn event_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for leg in self.legs() {
            if !ids.contains(&leg.selection.event_id.as_str()) {
                ids.push(&leg.selection.event_id);
            }
        }
        ids
    }
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

/// Stored bets grouped into wagers, plus the units that failed validation.
#[derive(Debug, Clone, Default)]
pub struct Assembly {
    pub wagers: Vec<Wager>,
    /// `LedgerError::DataIntegrity` per rejected unit.
    pub violations: Vec<LedgerError>,
}

/// Group stored legs into wagers, preserving first-seen order.
pub fn assemble(bets: &[Bet]) -> Assembly {
    let mut order: Vec<WagerKey> = Vec::new();
    let mut units: HashMap<WagerKey, Vec<Bet>> = HashMap::new();
    for bet in bets {
        let key = WagerKey::of(bet);
        units
            .entry(key)
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(bet.clone());
    }

    let mut assembly = Assembly::default();
    for key in order {
        let legs = units.remove(&key).unwrap_or_default();
        let built = match key {
            WagerKey::Single(_) if legs.len() == 1 => {
                legs.into_iter().next().map(Wager::single).unwrap_or_else(|| {
                    Err(integrity(key, "empty unit".to_string()))
                })
            }
            WagerKey::Single(_) => Err(integrity(key, format!("bet id stored {} times", legs.len()))),
            WagerKey::Group(_) => Group::new(legs).map(Wager::Parlay),
        };
        match built {
            Ok(wager) => assembly.wagers.push(wager),
            Err(e) => assembly.violations.push(e),
        }
    }
    assembly
}

/// Per-leg stored-state checks shared by singles and groups.
fn check_leg(key: WagerKey, bet: &Bet) -> Result<(), LedgerError> {
    if odds::validate(bet.odds).is_err() {
        return Err(integrity(key, format!("leg {} has invalid odds {}", bet.id, bet.odds)));
    }
    match bet.status {
        BetStatus::Pending if bet.result_value.is_some() || bet.profit.is_some() => Err(integrity(
            key,
            format!("leg {} is pending but carries a result or profit", bet.id),
        )),
        s if s.is_terminal() && bet.profit.is_none() => Err(integrity(
            key,
            format!("leg {} is {s} but has no profit", bet.id),
        )),
        _ => Ok(()),
    }
}

fn integrity(key: WagerKey, reason: String) -> LedgerError {
    LedgerError::DataIntegrity {
        wager: key.to_string(),
        reason,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
