//! Shared fixtures for the cross-crate tests: one sandbox of collaborators
//! wired into a ledger, planner, executor and settlement queue over a single
//! store.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use rust_decimal_macros::dec;
use splitpay_core::sandbox::{
    FixedRateOracle, FlatGasEstimator, SandboxBalanceProvider, SandboxChainClient, SandboxFiatRail,
};
use splitpay_core::{FiatCurrency, ManualClock, SplitPayConfig, Token};
use splitpay_payment::{FragmentExecutor, PaymentPlanner};
use splitpay_settlement::SettlementQueue;
use splitpay_store::{PlanStore, SettlementStore};
use splitpay_wallet::WalletLedger;

pub fn usdc() -> Token {
    Token::new("USDC").unwrap()
}

/// Fresh directory under the system temp dir.
pub fn temp_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("splitpay-it-{}", uuid::Uuid::now_v7()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Configuration with no pacing delay and short timeouts.
pub fn test_config() -> SplitPayConfig {
    SplitPayConfig::builder()
        .inter_fragment_delay(Duration::ZERO)
        .submit_timeout(Duration::from_millis(500))
        .balance_timeout(Duration::from_millis(500))
        .external_call_timeout(Duration::from_millis(500))
        .build()
        .unwrap()
}

pub struct Sandbox {
    pub config: SplitPayConfig,
    pub balances: Arc<SandboxBalanceProvider>,
    pub gas: Arc<FlatGasEstimator>,
    pub chain: Arc<SandboxChainClient>,
    pub fiat: Arc<SandboxFiatRail>,
    pub oracle: Arc<FixedRateOracle>,
    pub clock: Arc<ManualClock>,
    pub ledger: WalletLedger,
    pub planner: PaymentPlanner,
    pub executor: FragmentExecutor,
    pub queue: SettlementQueue,
}

impl Sandbox {
    /// Wire every component against `store`.
    pub fn new<S>(store: Arc<S>, config: SplitPayConfig) -> Self
    where
        S: PlanStore + SettlementStore + 'static,
    {
        let balances = Arc::new(SandboxBalanceProvider::new());
        let gas = Arc::new(FlatGasEstimator::new(dec!(0.01)));
        let chain = Arc::new(SandboxChainClient::new());
        let fiat = Arc::new(SandboxFiatRail::new());
        let oracle = Arc::new(
            FixedRateOracle::new()
                .with_rate(&usdc(), FiatCurrency::INR, dec!(83))
                .with_rate(&usdc(), FiatCurrency::BRL, dec!(5))
                .with_rate(&usdc(), FiatCurrency::EUR, dec!(0.92)),
        );
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 1, 15, 9, 0, 0).unwrap(),
        ));

        let ledger = WalletLedger::from_config(balances.clone(), &config.ledger);
        let planner = PaymentPlanner::new(
            gas.clone(),
            store.clone(),
            clock.clone(),
            config.executor.submit_timeout(),
        );
        let executor = FragmentExecutor::from_config(
            chain.clone(),
            store.clone(),
            clock.clone(),
            &config.executor,
        );
        let queue = SettlementQueue::new(
            store,
            chain.clone(),
            fiat.clone(),
            oracle.clone(),
            clock.clone(),
            config.settlement.clone(),
        );

        Self {
            config,
            balances,
            gas,
            chain,
            fiat,
            oracle,
            clock,
            ledger,
            planner,
            executor,
            queue,
        }
    }
}
