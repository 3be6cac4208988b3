//! Core engine — wager assembly, settlement, reconciliation and the ledger
//! summary.

pub mod accountant;
pub mod reconciler;
pub mod settlement;
pub mod wager;

pub use accountant::{Accountant, LedgerSummary};
pub use reconciler::{ApplyReport, DiscrepancyRecord, ReconciliationReport, Reconciler};
pub use settlement::{BatchSettlement, LegSettlement, Settlement, SettlementConfig, SettlementEngine};
pub use wager::{assemble, Assembly, Group, Wager, WagerKey};
