use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use splitpay_core::{
    with_timeout, Amount, BalanceProvider, Balances, Chain, CollaboratorError, CoreError,
    LedgerConfig, Network, Token, WalletId,
};

use crate::error::LedgerError;

/// A payer wallet known to the ledger.
///
/// Identity is `(chain, address)` and never changes after registration; only
/// the balances move, and only through a refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub wallet_id: WalletId,
    pub chain: Chain,
    pub network: Network,
    /// Opaque chain address.
    pub address: String,
    pub nickname: Option<String>,
    /// Native gas-token balance.
    pub native_balance: Amount,
    pub token_balances: BTreeMap<Token, Amount>,
    /// Position in registration order, used to break ties deterministically.
    pub registration_seq: u64,
    pub registered_at: DateTime<Utc>,
    pub last_refreshed_at: Option<DateTime<Utc>>,
}

impl Wallet {
    /// Last known balance of `token`, zero when never reported.
    pub fn balance_of(&self, token: &Token) -> Amount {
        self.token_balances
            .get(token)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    fn apply_balances(&mut self, balances: Balances, now: DateTime<Utc>) {
        self.native_balance = balances.native;
        self.token_balances = balances.tokens;
        self.last_refreshed_at = Some(now);
    }
}

/// Result of refreshing every registered wallet.
#[derive(Debug, Clone, Default)]
pub struct RefreshReport {
    pub refreshed: Vec<WalletId>,
    pub failed: Vec<(WalletId, CollaboratorError)>,
}

impl RefreshReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Concurrent wallet registry backed by DashMap.
///
/// Wallets are stored by id; a second map from `(chain, address)` to id
/// enforces uniqueness of the identity.
pub struct WalletLedger {
    wallets: DashMap<WalletId, Wallet>,
    identities: DashMap<(Chain, String), WalletId>,
    next_seq: AtomicU64,
    provider: Arc<dyn BalanceProvider>,
    balance_timeout: Duration,
}

impl WalletLedger {
    pub fn new(provider: Arc<dyn BalanceProvider>, balance_timeout: Duration) -> Self {
        Self {
            wallets: DashMap::new(),
            identities: DashMap::new(),
            next_seq: AtomicU64::new(0),
            provider,
            balance_timeout,
        }
    }

    pub fn from_config(provider: Arc<dyn BalanceProvider>, config: &LedgerConfig) -> Self {
        Self::new(provider, config.balance_timeout())
    }

    /// Register a wallet with zero balances. Fails with `DuplicateWallet` if
    /// `(chain, address)` is already registered.
    pub fn register_wallet(
        &self,
        chain: Chain,
        network: Network,
        address: &str,
        nickname: Option<String>,
    ) -> Result<WalletId, LedgerError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(CoreError::ValidationError("wallet address is empty".into()).into());
        }

        let wallet_id = match self.identities.entry((chain, address.to_string())) {
            Entry::Occupied(_) => {
                return Err(LedgerError::DuplicateWallet {
                    chain,
                    address: address.to_string(),
                })
            }
            Entry::Vacant(slot) => {
                let wallet_id = WalletId::new();
                let wallet = Wallet {
                    wallet_id,
                    chain,
                    network,
                    address: address.to_string(),
                    nickname,
                    native_balance: Decimal::ZERO,
                    token_balances: BTreeMap::new(),
                    registration_seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
                    registered_at: Utc::now(),
                    last_refreshed_at: None,
                };
                self.wallets.insert(wallet_id, wallet);
                slot.insert(wallet_id);
                wallet_id
            }
        };

        tracing::info!(wallet_id = %wallet_id, chain = %chain, network = %network, "wallet registered");
        Ok(wallet_id)
    }

    /// Query the balance provider for one wallet and store the result.
    ///
    /// On provider failure or timeout the stored balances are left as they
    /// were and the wallet stays registered.
    pub async fn refresh_balances(&self, wallet_id: WalletId) -> Result<Wallet, LedgerError> {
        let (chain, network, address) = {
            let wallet = self
                .wallets
                .get(&wallet_id)
                .ok_or(LedgerError::WalletNotFound(wallet_id))?;
            (wallet.chain, wallet.network, wallet.address.clone())
        };

        let balances = with_timeout(
            "balance-provider",
            self.balance_timeout,
            self.provider.get_balances(chain, network, &address),
        )
        .await
        .map_err(|source| {
            tracing::warn!(wallet_id = %wallet_id, chain = %chain, error = %source, "balance refresh failed");
            LedgerError::ProviderUnavailable { wallet_id, source }
        })?;

        let mut entry = self
            .wallets
            .get_mut(&wallet_id)
            .ok_or(LedgerError::WalletNotFound(wallet_id))?;
        entry.apply_balances(balances, Utc::now());
        tracing::debug!(wallet_id = %wallet_id, tokens = entry.token_balances.len(), "balances refreshed");
        Ok(entry.clone())
    }

    /// Refresh every wallet concurrently. One wallet's failure does not stop
    /// the others.
    pub async fn refresh_all(&self) -> RefreshReport {
        let ids: Vec<WalletId> = self.list_wallets().iter().map(|w| w.wallet_id).collect();
        let results =
            futures::future::join_all(ids.iter().map(|id| self.refresh_balances(*id))).await;

        let mut report = RefreshReport::default();
        for (wallet_id, result) in ids.into_iter().zip(results) {
            match result {
                Ok(_) => report.refreshed.push(wallet_id),
                Err(LedgerError::ProviderUnavailable { source, .. }) => {
                    report.failed.push((wallet_id, source))
                }
                // Removed while the sweep was running.
                Err(_) => {}
            }
        }
        tracing::info!(
            refreshed = report.refreshed.len(),
            failed = report.failed.len(),
            "wallet refresh sweep finished"
        );
        report
    }

    /// Wallets holding a positive balance of `token`, in registration order.
    pub fn get_wallets_with_token(&self, token: &Token) -> Vec<Wallet> {
        let mut wallets: Vec<Wallet> = self
            .wallets
            .iter()
            .filter(|w| w.balance_of(token) > Decimal::ZERO)
            .map(|w| w.value().clone())
            .collect();
        wallets.sort_by_key(|w| w.registration_seq);
        wallets
    }

    pub fn get_wallet(&self, wallet_id: WalletId) -> Option<Wallet> {
        self.wallets.get(&wallet_id).map(|w| w.value().clone())
    }

    /// Every registered wallet, in registration order.
    pub fn list_wallets(&self) -> Vec<Wallet> {
        let mut wallets: Vec<Wallet> = self.wallets.iter().map(|w| w.value().clone()).collect();
        wallets.sort_by_key(|w| w.registration_seq);
        wallets
    }

    /// Unregister a wallet. The `(chain, address)` pair becomes free again.
    pub fn remove_wallet(&self, wallet_id: WalletId) -> Result<Wallet, LedgerError> {
        let (_, wallet) = self
            .wallets
            .remove(&wallet_id)
            .ok_or(LedgerError::WalletNotFound(wallet_id))?;
        self.identities.remove(&(wallet.chain, wallet.address.clone()));
        tracing::info!(wallet_id = %wallet_id, "wallet removed");
        Ok(wallet)
    }

    /// Sum of the last known balances of `token` across all wallets.
    pub fn total_balance(&self, token: &Token) -> Amount {
        self.wallets.iter().map(|w| w.balance_of(token)).sum()
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }
}
