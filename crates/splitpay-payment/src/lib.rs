//! SplitPay payment layer.
//!
//! This crate provides:
//! - [`PaymentPlanner`]: splits one logical payment into per-wallet fragments
//!   using a deterministic greedy allocation.
//! - [`FragmentExecutor`]: submits a plan's fragments sequentially or in
//!   parallel, persisting each outcome as it lands.
//! - [`ExecutionSummary`] and [`FragmentOutcome`]: the per-plan result record.

pub mod error;
pub mod executor;
pub mod planner;

pub use error::PaymentError;
pub use executor::{ExecutionSummary, FragmentExecutor, FragmentOutcome};
pub use planner::{allocate, Allocation, PaymentPlanner};
