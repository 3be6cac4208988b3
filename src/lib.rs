//! BETLEDGER — settlement & confidence engine for a sports-wagering tracker
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod pricing;
pub mod confidence;
pub mod engine;
pub mod storage;
pub mod backtest;
