//! Persistence layer.
//!
//! The engine never persists anything itself; it talks to a `BetStore`.
//! `JsonFileStore` keeps the whole ledger (bets + correction audit) in a
//! single JSON snapshot, which is enough for a personal tracker. A store
//! must write all legs of one wager in one step so nobody ever reads a
//! half-settled parlay, and a leg rewrite that carries audit entries
//! lands together with them or not at all.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::wager::WagerKey;
use crate::types::{Bet, BetStatus};

/// Default ledger file path.
pub const DEFAULT_LEDGER_FILE: &str = "betledger.json";

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

/// One leg rewritten outside ordinary grading: an approved reconciliation
/// correction, or an ungradeable selection forced to void.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub wager: WagerKey,
    pub bet_id: Uuid,
    pub previous_status: BetStatus,
    pub previous_profit: Option<Decimal>,
    pub new_status: BetStatus,
    pub new_profit: Option<Decimal>,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// Persistence collaborator for stored bets.
#[cfg_attr(test, mockall::automock)]
pub trait BetStore {
    /// Every stored leg, in storage order.
    fn load_all(&self) -> Result<Vec<Bet>>;

    /// The stored legs of one wager, in storage order.
    fn load_wager(&self, key: WagerKey) -> Result<Vec<Bet>> {
        Ok(self.load_all()?.into_iter().filter(|b| key.contains(b)).collect())
    }

    /// Insert or replace the given legs in one atomic write.
    fn write_wager(&mut self, legs: &[Bet]) -> Result<()> {
        self.write_audited(legs, &[])
    }

    /// Insert or replace `legs` and append `entries` to the audit trail in
    /// one atomic write. On error neither is persisted.
    fn write_audited(&mut self, legs: &[Bet], entries: &[AuditEntry]) -> Result<()>;
}

/// Replace legs by id, appending the ones not stored yet.
fn upsert(bets: &mut Vec<Bet>, legs: &[Bet]) {
    for leg in legs {
        match bets.iter_mut().find(|b| b.id == leg.id) {
            Some(existing) => *existing = leg.clone(),
            None => bets.push(leg.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    bets: Vec<Bet>,
    audit: Vec<AuditEntry>,
}

impl MemoryStore {
    pub fn new(bets: Vec<Bet>) -> Self {
        Self {
            bets,
            audit: Vec::new(),
        }
    }

    pub fn audit(&self) -> &[AuditEntry] {
        &self.audit
    }
}

impl BetStore for MemoryStore {
    fn load_all(&self) -> Result<Vec<Bet>> {
        Ok(self.bets.clone())
    }

    fn write_audited(&mut self, legs: &[Bet], entries: &[AuditEntry]) -> Result<()> {
        upsert(&mut self.bets, legs);
        self.audit.extend_from_slice(entries);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JSON file store
// ---------------------------------------------------------------------------

/// On-disk layout of the ledger file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    #[serde(default)]
    pub bets: Vec<Bet>,
    #[serde(default)]
    pub audit: Vec<AuditEntry>,
}

/// Ledger kept in one JSON file. Every write replaces the file through a
/// temporary sibling and a rename.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshot. A missing file is an empty ledger.
    pub fn load_snapshot(&self) -> Result<LedgerSnapshot> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "No ledger file found, starting empty");
            return Ok(LedgerSnapshot::default());
        }

        let json = std::fs::read_to_string(&self.path)
            .context(format!("Failed to read ledger from {}", self.path.display()))?;
        let snapshot: LedgerSnapshot = serde_json::from_str(&json)
            .context(format!("Failed to parse ledger from {}", self.path.display()))?;

        debug!(
            path = %self.path.display(),
            bets = snapshot.bets.len(),
            audit = snapshot.audit.len(),
            "Ledger loaded"
        );
        Ok(snapshot)
    }

    pub fn save_snapshot(&self, snapshot: &LedgerSnapshot) -> Result<()> {
        let json = serde_json::to_string_pretty(snapshot).context("Failed to serialise ledger")?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, &json).context(format!("Failed to write ledger to {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path).context(format!(
            "Failed to move {} into place at {}",
            tmp.display(),
            self.path.display()
        ))?;

        debug!(path = %self.path.display(), bets = snapshot.bets.len(), "Ledger saved");
        Ok(())
    }

    pub fn audit(&self) -> Result<Vec<AuditEntry>> {
        Ok(self.load_snapshot()?.audit)
    }
}

impl BetStore for JsonFileStore {
    fn load_all(&self) -> Result<Vec<Bet>> {
        Ok(self.load_snapshot()?.bets)
    }

    fn write_audited(&mut self, legs: &[Bet], entries: &[AuditEntry]) -> Result<()> {
        let mut snapshot = self.load_snapshot()?;
        upsert(&mut snapshot.bets, legs);
        snapshot.audit.extend_from_slice(entries);
        self.save_snapshot(&snapshot)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
