//! SplitPay persistence layer.
//!
//! Provides the [`PlanStore`] and [`SettlementStore`] interfaces and two
//! implementations:
//! - [`MemoryStore`]: deterministic in-memory store for tests and single-process use.
//! - [`RocksStore`]: durable RocksDB store with transactional status swaps.

pub mod error;
pub mod memory;
pub mod rocks;
pub mod traits;

#[cfg(test)]
mod testing;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use rocks::RocksStore;
pub use traits::{PlanStore, SettlementStore};
