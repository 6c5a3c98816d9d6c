//! SplitPay Settlement Layer
//!
//! Queues completed payments for fiat settlement, holds them for the dispute
//! window, then withdraws the escrowed crypto and pays the merchant over a
//! fiat rail, recording a BLAKE3 proof of settlement.

pub mod error;
pub mod proof;
pub mod queue;
pub mod types;

pub use error::SettlementError;
pub use proof::{proof_hash, verify_proof};
pub use queue::SettlementQueue;
pub use types::{
    Reconciliation, SettlementFilter, SettlementOrder, SettlementOutcome, SettlementStats,
    SweepReport,
};
