//! Deterministic in-memory collaborators.
//!
//! Every value they return (balances, fees, transaction hashes, fiat
//! references, exchange rates) is either configured up front or derived from
//! a counter, so runs are reproducible. Failures and latency can be scripted
//! per address to exercise partial-failure paths.

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::CollaboratorError;
use crate::payment_method::{FiatCurrency, MerchantPaymentMethod};
use crate::traits::{BalanceProvider, ChainClient, FiatRail, GasEstimator, PriceOracle};
use crate::types::{Amount, Balances, Chain, Network, Token};

/// Balance provider backed by a table of configured balances.
#[derive(Default)]
pub struct SandboxBalanceProvider {
    balances: DashMap<(Chain, String), Balances>,
    failures: DashMap<String, CollaboratorError>,
    latency: DashMap<String, Duration>,
    calls: AtomicUsize,
}

impl SandboxBalanceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_balances(&self, chain: Chain, address: &str, balances: Balances) {
        self.balances.insert((chain, address.to_string()), balances);
    }

    /// Convenience: set a single token balance, keeping any others.
    pub fn set_token_balance(&self, chain: Chain, address: &str, token: &Token, amount: Amount) {
        self.balances
            .entry((chain, address.to_string()))
            .or_default()
            .tokens
            .insert(token.clone(), amount);
    }

    pub fn fail_address(&self, address: &str, error: CollaboratorError) {
        self.failures.insert(address.to_string(), error);
    }

    pub fn clear_failure(&self, address: &str) {
        self.failures.remove(address);
    }

    pub fn delay_address(&self, address: &str, delay: Duration) {
        self.latency.insert(address.to_string(), delay);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BalanceProvider for SandboxBalanceProvider {
    async fn get_balances(
        &self,
        chain: Chain,
        _network: Network,
        address: &str,
    ) -> Result<Balances, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.latency.get(address).map(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.failures.get(address) {
            return Err(err.clone());
        }
        Ok(self
            .balances
            .get(&(chain, address.to_string()))
            .map(|b| b.clone())
            .unwrap_or_default())
    }
}

/// Gas estimator charging a fixed fee per chain.
pub struct FlatGasEstimator {
    default_fee: Amount,
    per_chain: DashMap<Chain, Amount>,
    unavailable: Mutex<bool>,
}

impl FlatGasEstimator {
    pub fn new(default_fee: Amount) -> Self {
        Self {
            default_fee,
            per_chain: DashMap::new(),
            unavailable: Mutex::new(false),
        }
    }

    pub fn with_chain_fee(self, chain: Chain, fee: Amount) -> Self {
        self.per_chain.insert(chain, fee);
        self
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap_or_else(|p| p.into_inner()) = unavailable;
    }
}

#[async_trait]
impl GasEstimator for FlatGasEstimator {
    async fn estimate_fee(
        &self,
        chain: Chain,
        _network: Network,
        _token: &Token,
        _amount: Amount,
    ) -> Result<Amount, CollaboratorError> {
        if *self.unavailable.lock().unwrap_or_else(|p| p.into_inner()) {
            return Err(CollaboratorError::unavailable("gas-estimator", "sandbox outage"));
        }
        Ok(self
            .per_chain
            .get(&chain)
            .map(|f| *f)
            .unwrap_or(self.default_fee))
    }
}

/// A transfer the sandbox chain accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedTransfer {
    pub chain: Chain,
    pub from: String,
    pub to: String,
    pub amount: Amount,
    pub token: Token,
    pub tx_hash: String,
}

/// Chain client that confirms instantly with sequential transaction hashes.
#[derive(Default)]
pub struct SandboxChainClient {
    nonce: AtomicU64,
    failing_senders: DashMap<String, CollaboratorError>,
    latency: DashMap<String, Duration>,
    withdrawal_failure: Mutex<Option<CollaboratorError>>,
    withdrawal_delay: Mutex<Option<Duration>>,
    transfers: Mutex<Vec<RecordedTransfer>>,
    withdrawals: AtomicUsize,
}

impl SandboxChainClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every transfer sent from `address`.
    pub fn fail_sender(&self, address: &str, error: CollaboratorError) {
        self.failing_senders.insert(address.to_string(), error);
    }

    pub fn clear_sender_failure(&self, address: &str) {
        self.failing_senders.remove(address);
    }

    /// Delay confirmations for transfers sent from `address`.
    pub fn delay_sender(&self, address: &str, delay: Duration) {
        self.latency.insert(address.to_string(), delay);
    }

    pub fn fail_withdrawals(&self, error: Option<CollaboratorError>) {
        *self.withdrawal_failure.lock().unwrap_or_else(|p| p.into_inner()) = error;
    }

    pub fn delay_withdrawals(&self, delay: Option<Duration>) {
        *self.withdrawal_delay.lock().unwrap_or_else(|p| p.into_inner()) = delay;
    }

    /// Transfers accepted so far, in confirmation order.
    pub fn transfers(&self) -> Vec<RecordedTransfer> {
        self.transfers.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Number of escrow withdrawals attempted.
    pub fn withdrawal_count(&self) -> usize {
        self.withdrawals.load(Ordering::SeqCst)
    }

    fn next_hash(&self) -> String {
        let n = self.nonce.fetch_add(1, Ordering::SeqCst) + 1;
        format!("0x{:064x}", n)
    }
}

#[async_trait]
impl ChainClient for SandboxChainClient {
    async fn submit_transfer(
        &self,
        chain: Chain,
        _network: Network,
        from_wallet: &str,
        to_address: &str,
        amount: Amount,
        token: &Token,
    ) -> Result<String, CollaboratorError> {
        let delay = self.latency.get(from_wallet).map(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.failing_senders.get(from_wallet) {
            return Err(err.clone());
        }
        let tx_hash = self.next_hash();
        self.transfers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(RecordedTransfer {
                chain,
                from: from_wallet.to_string(),
                to: to_address.to_string(),
                amount,
                token: token.clone(),
                tx_hash: tx_hash.clone(),
            });
        Ok(tx_hash)
    }

    async fn withdraw_from_escrow(
        &self,
        _escrow_address: &str,
        _amount: Amount,
        _token: &Token,
    ) -> Result<String, CollaboratorError> {
        self.withdrawals.fetch_add(1, Ordering::SeqCst);
        let delay = *self.withdrawal_delay.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self
            .withdrawal_failure
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        if let Some(err) = failure {
            return Err(err);
        }
        Ok(self.next_hash())
    }
}

/// A payout the sandbox rail accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPayout {
    pub method: MerchantPaymentMethod,
    pub amount: Amount,
    pub currency: FiatCurrency,
    pub reference: String,
}

/// Fiat rail that accepts payouts with sequential references.
#[derive(Default)]
pub struct SandboxFiatRail {
    counter: AtomicU64,
    failure: Mutex<Option<CollaboratorError>>,
    payouts: Mutex<Vec<RecordedPayout>>,
}

impl SandboxFiatRail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_transfers(&self, error: Option<CollaboratorError>) {
        *self.failure.lock().unwrap_or_else(|p| p.into_inner()) = error;
    }

    pub fn payouts(&self) -> Vec<RecordedPayout> {
        self.payouts.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[async_trait]
impl FiatRail for SandboxFiatRail {
    async fn transfer(
        &self,
        method: &MerchantPaymentMethod,
        fiat_amount: Amount,
        fiat_currency: FiatCurrency,
    ) -> Result<String, CollaboratorError> {
        let failure = self.failure.lock().unwrap_or_else(|p| p.into_inner()).clone();
        if let Some(err) = failure {
            return Err(err);
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let reference = format!("{}-{:08}", method.kind().to_ascii_uppercase(), n);
        self.payouts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(RecordedPayout {
                method: method.clone(),
                amount: fiat_amount,
                currency: fiat_currency,
                reference: reference.clone(),
            });
        Ok(reference)
    }
}

/// Price oracle with fixed token/fiat rates.
#[derive(Default)]
pub struct FixedRateOracle {
    rates: DashMap<(Token, FiatCurrency), Decimal>,
    calls: AtomicUsize,
}

impl FixedRateOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate(self, token: &Token, fiat: FiatCurrency, rate: Decimal) -> Self {
        self.set_rate(token, fiat, rate);
        self
    }

    pub fn set_rate(&self, token: &Token, fiat: FiatCurrency, rate: Decimal) {
        self.rates.insert((token.clone(), fiat), rate);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceOracle for FixedRateOracle {
    async fn convert(
        &self,
        amount: Amount,
        from_token: &Token,
        to_fiat: FiatCurrency,
    ) -> Result<Amount, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let rate = self
            .rates
            .get(&(from_token.clone(), to_fiat))
            .map(|r| *r)
            .ok_or_else(|| {
                CollaboratorError::unavailable(
                    "price-oracle",
                    format!("no rate for {}/{}", from_token, to_fiat),
                )
            })?;
        Ok(amount * rate)
    }
}
