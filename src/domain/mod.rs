//! Core domain types and logic.

pub mod bar;
pub mod holding;
pub mod position;
pub mod ledger;
pub mod oi;
pub mod sma;
pub mod strategy;
pub mod metrics;
pub mod simulator;
pub mod error;
