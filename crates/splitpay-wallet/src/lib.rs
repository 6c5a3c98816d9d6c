//! SplitPay wallet ledger.
//!
//! - [`WalletLedger`]: concurrent registry of payer wallets keyed by
//!   `(chain, address)`, refreshed from a [`splitpay_core::BalanceProvider`].
//! - [`Wallet`]: a registered wallet with its last known balances.

pub mod error;
pub mod ledger;

pub use error::LedgerError;
pub use ledger::{RefreshReport, Wallet, WalletLedger};
