use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use splitpay_core::{
    with_timeout, Amount, Clock, CoreError, FragmentStatus, GasEstimator, PaymentFragment,
    PaymentId, PaymentPlan, PaymentTarget, PlanConstraints, PlanStatus, Token,
};
use splitpay_store::PlanStore;
use splitpay_wallet::Wallet;

use crate::error::PaymentError;

/// One wallet's share of a payment, before gas estimation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub wallet: Wallet,
    pub amount: Amount,
}

/// Splits a payment across wallets and persists the resulting plan.
///
/// Allocation is greedy over wallets sorted by available balance, largest
/// first, with registration order breaking ties, so the same inputs always
/// produce the same fragment list.
pub struct PaymentPlanner {
    gas: Arc<dyn GasEstimator>,
    store: Arc<dyn PlanStore>,
    clock: Arc<dyn Clock>,
    estimate_timeout: Duration,
}

impl PaymentPlanner {
    pub fn new(
        gas: Arc<dyn GasEstimator>,
        store: Arc<dyn PlanStore>,
        clock: Arc<dyn Clock>,
        estimate_timeout: Duration,
    ) -> Self {
        Self {
            gas,
            store,
            clock,
            estimate_timeout,
        }
    }

    /// Build, estimate, and persist a plan covering `total_amount` of
    /// `target_token`.
    ///
    /// Nothing is persisted unless every step succeeds.
    pub async fn create_plan(
        &self,
        target: PaymentTarget,
        total_amount: Amount,
        target_token: &Token,
        candidates: &[Wallet],
        constraints: &PlanConstraints,
    ) -> Result<PaymentPlan, PaymentError> {
        if target.escrow_address.trim().is_empty() {
            return Err(CoreError::ValidationError("escrow address is empty".into()).into());
        }

        let allocations = allocate(candidates, target_token, total_amount, constraints)?;

        let mut fragments = Vec::with_capacity(allocations.len());
        for (index, allocation) in allocations.into_iter().enumerate() {
            let wallet = allocation.wallet;
            let gas_estimate = with_timeout(
                "gas-estimator",
                self.estimate_timeout,
                self.gas
                    .estimate_fee(wallet.chain, wallet.network, target_token, allocation.amount),
            )
            .await
            .map_err(PaymentError::ProviderUnavailable)?;

            fragments.push(PaymentFragment {
                index,
                wallet_id: wallet.wallet_id,
                chain: wallet.chain,
                network: wallet.network,
                address: wallet.address,
                amount: allocation.amount,
                token: target_token.clone(),
                gas_estimate,
                status: FragmentStatus::Pending,
                transaction_hash: None,
                error: None,
            });
        }

        let plan = PaymentPlan {
            payment_id: PaymentId::new(),
            target,
            total_amount,
            target_token: target_token.clone(),
            fragments,
            status: PlanStatus::Planning,
            created_at: self.clock.now(),
            completed_at: None,
        };
        self.store.insert_plan(&plan).await?;

        tracing::info!(
            payment_id = %plan.payment_id,
            total = %total_amount,
            token = %target_token,
            fragments = plan.fragments.len(),
            "payment plan created"
        );
        Ok(plan)
    }
}

/// Greedy allocation of `total` across `candidates`.
///
/// A wallet whose share would fall below `min_fragment` is skipped on the
/// first pass unless that share closes the remainder. If the first pass
/// leaves a remainder, skipped wallets are used in a second pass regardless
/// of size. Allocation stops at `max_fragments`. A wallet listed more than
/// once is considered once, at its first occurrence.
pub fn allocate(
    candidates: &[Wallet],
    token: &Token,
    total: Amount,
    constraints: &PlanConstraints,
) -> Result<Vec<Allocation>, PaymentError> {
    if total <= Decimal::ZERO {
        return Err(CoreError::InvalidAmount(format!(
            "payment total must be positive, got {}",
            total
        ))
        .into());
    }
    constraints.validate()?;

    let mut seen = HashSet::new();
    let mut eligible: Vec<&Wallet> = candidates
        .iter()
        .filter(|w| seen.insert(w.wallet_id))
        .filter(|w| w.balance_of(token) > Decimal::ZERO)
        .collect();
    if eligible.is_empty() {
        return Err(PaymentError::NoEligibleWallets {
            token: token.clone(),
        });
    }
    eligible.sort_by(|a, b| {
        b.balance_of(token)
            .cmp(&a.balance_of(token))
            .then(a.registration_seq.cmp(&b.registration_seq))
            .then(a.wallet_id.cmp(&b.wallet_id))
    });

    let mut remaining = total;
    let mut allocations = Vec::new();
    let mut skipped = Vec::new();

    for wallet in eligible {
        if remaining.is_zero() || allocations.len() >= constraints.max_fragments {
            break;
        }
        let amount = remaining.min(wallet.balance_of(token));
        if amount < constraints.min_fragment && amount != remaining {
            skipped.push(wallet);
            continue;
        }
        remaining -= amount;
        allocations.push(Allocation {
            wallet: wallet.clone(),
            amount,
        });
    }

    // Dust wallets are only used when nothing else can cover the rest.
    for wallet in skipped {
        if remaining.is_zero() || allocations.len() >= constraints.max_fragments {
            break;
        }
        let amount = remaining.min(wallet.balance_of(token));
        remaining -= amount;
        allocations.push(Allocation {
            wallet: wallet.clone(),
            amount,
        });
    }

    if remaining > Decimal::ZERO {
        tracing::debug!(requested = %total, remaining = %remaining, "allocation short");
        return Err(PaymentError::InsufficientFunds {
            requested: total,
            remaining,
        });
    }
    Ok(allocations)
}
