use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

use crate::error::CollaboratorError;
use crate::payment_method::{FiatCurrency, MerchantPaymentMethod};
use crate::types::{Amount, Balances, Chain, Network, Token};

/// Source of on-chain balances for a wallet address.
///
/// Implementations may be slow or unavailable; callers treat failures as
/// non-fatal.
#[async_trait]
pub trait BalanceProvider: Send + Sync {
    async fn get_balances(
        &self,
        chain: Chain,
        network: Network,
        address: &str,
    ) -> Result<Balances, CollaboratorError>;
}

/// Estimates the network fee for a token transfer.
#[async_trait]
pub trait GasEstimator: Send + Sync {
    async fn estimate_fee(
        &self,
        chain: Chain,
        network: Network,
        token: &Token,
        amount: Amount,
    ) -> Result<Amount, CollaboratorError>;
}

/// Submits transfers to a blockchain.
///
/// Once a call has been issued the submission is not cancellable.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Transfer `amount` of `token` from a payer wallet. Returns the
    /// transaction hash.
    async fn submit_transfer(
        &self,
        chain: Chain,
        network: Network,
        from_wallet: &str,
        to_address: &str,
        amount: Amount,
        token: &Token,
    ) -> Result<String, CollaboratorError>;

    /// Release `amount` of `token` from an escrow contract to the settler.
    /// Returns the transaction hash.
    async fn withdraw_from_escrow(
        &self,
        escrow_address: &str,
        amount: Amount,
        token: &Token,
    ) -> Result<String, CollaboratorError>;
}

/// Pays merchants in fiat.
#[async_trait]
pub trait FiatRail: Send + Sync {
    /// Returns the rail's transfer reference.
    async fn transfer(
        &self,
        method: &MerchantPaymentMethod,
        fiat_amount: Amount,
        fiat_currency: FiatCurrency,
    ) -> Result<String, CollaboratorError>;
}

/// Converts token amounts into fiat.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn convert(
        &self,
        amount: Amount,
        from_token: &Token,
        to_fiat: FiatCurrency,
    ) -> Result<Amount, CollaboratorError>;
}

/// Run a collaborator call under a deadline. An elapsed deadline becomes a
/// retryable [`CollaboratorError::Timeout`].
pub async fn with_timeout<T, F>(
    service: &str,
    limit: Duration,
    call: F,
) -> Result<T, CollaboratorError>
where
    F: Future<Output = Result<T, CollaboratorError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(service, timeout_ms = limit.as_millis() as u64, "collaborator call timed out");
            Err(CollaboratorError::Timeout {
                service: service.to_string(),
                elapsed: limit,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_passes_through() {
        let result = with_timeout("oracle", Duration::from_secs(1), async {
            Ok::<_, CollaboratorError>(7)
        })
        .await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_with_timeout_elapses() {
        let result: Result<(), _> = with_timeout("chain", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        match result {
            Err(err @ CollaboratorError::Timeout { .. }) => assert!(err.is_retryable()),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_with_timeout_keeps_inner_error() {
        let result: Result<(), _> = with_timeout("fiat-rail", Duration::from_secs(1), async {
            Err(CollaboratorError::rejected("fiat-rail", "account closed"))
        })
        .await;
        assert!(matches!(result, Err(CollaboratorError::Rejected { .. })));
    }
}
