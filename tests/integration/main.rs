//! End-to-end tests: intake → settlement → storage → reconciliation.

mod common;
mod confidence;
mod reconciliation;
mod scenarios;
