use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::{Decimal, RoundingStrategy};
use splitpay_core::{
    with_timeout, ChainClient, Clock, CollaboratorError, CoreError, FiatRail, PriceOracle,
    ReconciliationCase, SettlementConfig, SettlementEvent, SettlementId, SettlementRequest,
    SettlementStatus,
};
use splitpay_store::{SettlementStore, StoreError};

use crate::error::SettlementError;
use crate::proof::proof_hash;
use crate::types::{
    Reconciliation, SettlementFilter, SettlementOrder, SettlementOutcome, SettlementStats,
    SweepReport,
};

/// Drives settlement requests from queueing through dispute-window gating
/// to escrow withdrawal and fiat payout.
///
/// Every status change is a compare-and-swap against the settlement store.
/// The `ready → settling` swap happens before any external call, so of two
/// concurrent executions of the same settlement only one ever reaches the
/// chain client.
pub struct SettlementQueue {
    store: Arc<dyn SettlementStore>,
    chain: Arc<dyn ChainClient>,
    fiat: Arc<dyn FiatRail>,
    oracle: Arc<dyn PriceOracle>,
    clock: Arc<dyn Clock>,
    config: SettlementConfig,
}

impl SettlementQueue {
    pub fn new(
        store: Arc<dyn SettlementStore>,
        chain: Arc<dyn ChainClient>,
        fiat: Arc<dyn FiatRail>,
        oracle: Arc<dyn PriceOracle>,
        clock: Arc<dyn Clock>,
        config: SettlementConfig,
    ) -> Self {
        Self {
            store,
            chain,
            fiat,
            oracle,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    /// Validate an order, lock its fiat amount, and persist it as `pending`.
    pub async fn queue_settlement(
        &self,
        order: SettlementOrder,
    ) -> Result<SettlementRequest, SettlementError> {
        if order.amount <= Decimal::ZERO {
            return Err(CoreError::InvalidAmount(format!(
                "settlement amount must be positive, got {}",
                order.amount
            ))
            .into());
        }
        if !self.config.is_chain_supported(order.chain) {
            return Err(CoreError::UnsupportedChain(order.chain.to_string()).into());
        }
        order.merchant_payment_method.validate()?;
        for (field, value) in [
            ("escrow_id", &order.escrow_id),
            ("escrow_address", &order.escrow_address),
            ("merchant_id", &order.merchant_id),
            ("payer_address", &order.payer_address),
        ] {
            if value.trim().is_empty() {
                return Err(CoreError::ValidationError(format!("{} is empty", field)).into());
            }
        }

        let fiat_currency = order.merchant_payment_method.fiat_currency();
        let raw_fiat = with_timeout(
            "price-oracle",
            self.config.external_call_timeout(),
            self.oracle.convert(order.amount, &order.token, fiat_currency),
        )
        .await
        .map_err(SettlementError::ProviderUnavailable)?;
        let fiat_amount = raw_fiat.round_dp_with_strategy(
            fiat_currency.decimals(),
            RoundingStrategy::MidpointAwayFromZero,
        );

        let created_at = self.clock.now();
        let settlement = SettlementRequest {
            settlement_id: SettlementId::new(),
            escrow_id: order.escrow_id,
            escrow_address: order.escrow_address,
            merchant_id: order.merchant_id,
            payer_address: order.payer_address,
            crypto_amount: order.amount,
            token: order.token,
            chain: order.chain,
            merchant_payment_method: order.merchant_payment_method,
            fiat_amount,
            fiat_currency,
            exchange_rate: raw_fiat / order.amount,
            status: SettlementStatus::Pending,
            dispute_period_end: created_at + self.config.dispute_period(),
            crypto_tx_hash: None,
            fiat_tx_ref: None,
            proof_hash: None,
            failure_reason: None,
            dispute_reason: None,
            created_at,
            settled_at: None,
        };
        self.store.insert_settlement(&settlement).await?;

        tracing::info!(
            settlement_id = %settlement.settlement_id,
            merchant_id = %settlement.merchant_id,
            amount = %settlement.crypto_amount,
            token = %settlement.token,
            fiat = %settlement.fiat_amount,
            currency = %fiat_currency,
            dispute_period_end = %settlement.dispute_period_end,
            "settlement queued"
        );
        Ok(settlement)
    }

    pub async fn get_settlement(
        &self,
        settlement_id: SettlementId,
    ) -> Result<SettlementRequest, SettlementError> {
        self.store
            .get_settlement(settlement_id)
            .await?
            .ok_or(SettlementError::NotFound(settlement_id))
    }

    /// Execute a `ready` settlement: withdraw from escrow, pay the merchant,
    /// record the proof.
    ///
    /// Collaborator failures after the claim are reported through the
    /// returned [`SettlementOutcome`], not as errors.
    pub async fn execute_settlement(
        &self,
        settlement_id: SettlementId,
    ) -> Result<SettlementOutcome, SettlementError> {
        let current = self.get_settlement(settlement_id).await?;
        if current.status != SettlementStatus::Ready {
            return Err(SettlementError::InvalidState {
                settlement_id,
                status: current.status,
                operation: "execute",
            });
        }
        let claimed = self
            .advance(current, SettlementEvent::ExecutionStarted, "execute", |_| {})
            .await?;
        tracing::info!(settlement_id = %settlement_id, "settlement claimed for execution");

        let withdrawal = with_timeout(
            "chain-client",
            self.config.external_call_timeout(),
            self.chain.withdraw_from_escrow(
                &claimed.escrow_address,
                claimed.crypto_amount,
                &claimed.token,
            ),
        )
        .await;
        let crypto_tx_hash = match withdrawal {
            Ok(hash) => hash,
            Err(err @ CollaboratorError::Rejected { .. }) => {
                let reason = err.to_string();
                tracing::warn!(settlement_id = %settlement_id, error = %reason, "escrow withdrawal rejected");
                let failed = self
                    .advance(claimed, SettlementEvent::WithdrawalFailed, "fail", |s| {
                        s.failure_reason = Some(reason.clone());
                    })
                    .await?;
                return Ok(SettlementOutcome::WithdrawalFailed {
                    settlement: failed,
                    reason,
                });
            }
            Err(err) => {
                // A timed-out submission can still land on chain.
                let reason = err.to_string();
                tracing::error!(
                    settlement_id = %settlement_id,
                    error = %reason,
                    "escrow withdrawal unconfirmed; settlement needs reconciliation"
                );
                let mut unconfirmed = claimed;
                unconfirmed.failure_reason = Some(reason.clone());
                self.swap(SettlementStatus::Settling, &unconfirmed, "record unconfirmed withdrawal")
                    .await?;
                return Ok(SettlementOutcome::WithdrawalUnconfirmed {
                    settlement: unconfirmed,
                    reason,
                });
            }
        };

        // The withdrawal hash is stored before the payout call.
        let mut withdrawn = claimed.clone();
        withdrawn.crypto_tx_hash = Some(crypto_tx_hash);
        if let Err(err) = self
            .swap(SettlementStatus::Settling, &withdrawn, "record withdrawal")
            .await
        {
            tracing::error!(
                settlement_id = %settlement_id,
                crypto_tx_hash = ?withdrawn.crypto_tx_hash,
                error = %err,
                "withdrawal landed but could not be recorded; settlement needs reconciliation"
            );
            return Err(err);
        }

        let payout = with_timeout(
            "fiat-rail",
            self.config.external_call_timeout(),
            self.fiat.transfer(
                &withdrawn.merchant_payment_method,
                withdrawn.fiat_amount,
                withdrawn.fiat_currency,
            ),
        )
        .await;
        match payout {
            Ok(fiat_tx_ref) => {
                let completed = self.complete(withdrawn, fiat_tx_ref).await?;
                Ok(SettlementOutcome::Completed(completed))
            }
            Err(err) => {
                let reason = err.to_string();
                tracing::error!(
                    settlement_id = %settlement_id,
                    crypto_tx_hash = ?withdrawn.crypto_tx_hash,
                    error = %reason,
                    "fiat payout failed after escrow withdrawal; settlement needs reconciliation"
                );
                let mut inconsistent = withdrawn;
                inconsistent.failure_reason = Some(reason.clone());
                self.swap(SettlementStatus::Settling, &inconsistent, "record payout failure")
                    .await?;
                Ok(SettlementOutcome::Inconsistent {
                    settlement: inconsistent,
                    reason,
                })
            }
        }
    }

    /// Promote every pending settlement whose dispute window has elapsed and
    /// execute all ready settlements.
    ///
    /// Settlements another worker moved first are skipped, not failed.
    pub async fn process_ready_settlements(&self) -> Result<SweepReport, SettlementError> {
        let now = self.clock.now();
        let mut candidates = self.store.list_settlements().await?;
        candidates.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then(a.settlement_id.cmp(&b.settlement_id))
        });

        let mut report = SweepReport::default();
        let mut ready = Vec::new();
        for settlement in candidates {
            let settlement_id = settlement.settlement_id;
            match settlement.status {
                SettlementStatus::Pending if settlement.dispute_window_elapsed(now) => {
                    match self
                        .advance(settlement, SettlementEvent::DisputeWindowElapsed, "promote", |_| {})
                        .await
                    {
                        Ok(_) => {
                            tracing::info!(settlement_id = %settlement_id, "dispute window elapsed; settlement ready");
                            report.promoted.push(settlement_id);
                            ready.push(settlement_id);
                        }
                        Err(SettlementError::InvalidState { .. }) => {
                            report.skipped.push(settlement_id)
                        }
                        Err(err) => return Err(err),
                    }
                }
                SettlementStatus::Ready => ready.push(settlement_id),
                _ => {}
            }
        }

        for settlement_id in ready {
            match self.execute_settlement(settlement_id).await {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(SettlementError::InvalidState { .. }) => report.skipped.push(settlement_id),
                Err(err) => {
                    tracing::error!(settlement_id = %settlement_id, error = %err, "settlement execution errored");
                    report.errors.push((settlement_id, err.to_string()));
                }
            }
        }

        tracing::info!(
            promoted = report.promoted.len(),
            executed = report.outcomes.len(),
            completed = report.completed(),
            reconciliation = report.needs_reconciliation(),
            skipped = report.skipped.len(),
            "settlement sweep finished"
        );
        Ok(report)
    }

    /// Settlements matching `filter`, newest first.
    pub async fn list_settlements(
        &self,
        filter: &SettlementFilter,
    ) -> Result<Vec<SettlementRequest>, SettlementError> {
        let mut settlements: Vec<SettlementRequest> = self
            .store
            .list_settlements()
            .await?
            .into_iter()
            .filter(|s| filter.matches(s))
            .collect();
        settlements.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.settlement_id.cmp(&a.settlement_id))
        });
        if let Some(limit) = filter.limit {
            settlements.truncate(limit);
        }
        Ok(settlements)
    }

    /// Per-status counts plus volume and fees over completed settlements.
    pub async fn get_settlement_stats(&self) -> Result<SettlementStats, SettlementError> {
        let settlements = self.store.list_settlements().await?;
        let mut by_status: BTreeMap<SettlementStatus, usize> =
            SettlementStatus::ALL.iter().map(|s| (*s, 0)).collect();
        let mut volume_by_token = BTreeMap::new();
        let mut total_volume = Decimal::ZERO;

        for settlement in &settlements {
            *by_status.entry(settlement.status).or_insert(0) += 1;
            if settlement.status == SettlementStatus::Completed {
                total_volume += settlement.crypto_amount;
                *volume_by_token
                    .entry(settlement.token.clone())
                    .or_insert(Decimal::ZERO) += settlement.crypto_amount;
            }
        }

        Ok(SettlementStats {
            by_status,
            total_settlements: settlements.len(),
            total_volume,
            total_fees: self.config.fee_for(total_volume),
            volume_by_token,
        })
    }

    /// Contest a pending settlement while its dispute window is open.
    pub async fn raise_dispute(
        &self,
        settlement_id: SettlementId,
        reason: &str,
    ) -> Result<SettlementRequest, SettlementError> {
        let current = self.get_settlement(settlement_id).await?;
        if current.status == SettlementStatus::Pending
            && current.dispute_window_elapsed(self.clock.now())
        {
            return Err(SettlementError::InvalidState {
                settlement_id,
                status: current.status,
                operation: "dispute after the window closed",
            });
        }
        let reason = reason.to_string();
        let disputed = self
            .advance(current, SettlementEvent::DisputeRaised, "dispute", |s| {
                s.dispute_reason = Some(reason);
            })
            .await?;
        tracing::info!(settlement_id = %settlement_id, "settlement disputed");
        Ok(disputed)
    }

    /// Withdraw a pending settlement before it becomes ready.
    pub async fn cancel_settlement(
        &self,
        settlement_id: SettlementId,
    ) -> Result<SettlementRequest, SettlementError> {
        let current = self.get_settlement(settlement_id).await?;
        let cancelled = self
            .advance(current, SettlementEvent::Cancelled, "cancel", |_| {})
            .await?;
        tracing::info!(settlement_id = %settlement_id, "settlement cancelled");
        Ok(cancelled)
    }

    /// Put a settlement whose withdrawal failed back into `ready`.
    pub async fn requeue_failed(
        &self,
        settlement_id: SettlementId,
    ) -> Result<SettlementRequest, SettlementError> {
        let current = self.get_settlement(settlement_id).await?;
        let requeued = self
            .advance(current, SettlementEvent::Requeued, "requeue", |s| {
                s.failure_reason = None;
            })
            .await?;
        tracing::info!(settlement_id = %settlement_id, "failed settlement requeued");
        Ok(requeued)
    }

    /// Every `settling` settlement without a fiat payout, oldest first,
    /// tagged with whether its withdrawal hash is known.
    ///
    /// A settlement whose execution is still in flight also shows up here
    /// until its payout is recorded.
    pub async fn list_inconsistent(&self) -> Result<Vec<Reconciliation>, SettlementError> {
        let mut settlements: Vec<Reconciliation> = self
            .store
            .list_settlements()
            .await?
            .into_iter()
            .filter_map(|settlement| {
                settlement
                    .reconciliation_case()
                    .map(|case| Reconciliation { case, settlement })
            })
            .collect();
        settlements.sort_by(|a, b| {
            a.settlement
                .created_at
                .cmp(&b.settlement.created_at)
                .then(a.settlement.settlement_id.cmp(&b.settlement.settlement_id))
        });
        Ok(settlements)
    }

    /// Record a withdrawal an operator found on chain for a settlement whose
    /// hash was never stored. The settlement then awaits its payout through
    /// [`resolve_inconsistent`](Self::resolve_inconsistent).
    pub async fn confirm_withdrawal(
        &self,
        settlement_id: SettlementId,
        crypto_tx_hash: &str,
    ) -> Result<SettlementRequest, SettlementError> {
        let current = self
            .reconciling(settlement_id, ReconciliationCase::WithdrawalUnknown, "confirm withdrawal")
            .await?;
        if crypto_tx_hash.trim().is_empty() {
            return Err(CoreError::ValidationError("crypto_tx_hash is empty".into()).into());
        }
        let mut withdrawn = current;
        withdrawn.crypto_tx_hash = Some(crypto_tx_hash.to_string());
        self.swap(SettlementStatus::Settling, &withdrawn, "confirm withdrawal")
            .await?;
        tracing::info!(settlement_id = %settlement_id, crypto_tx_hash, "withdrawal confirmed by operator");
        Ok(withdrawn)
    }

    /// Mark a settlement `failed` once an operator has verified its
    /// withdrawal never left escrow, so it can be requeued.
    pub async fn release_withdrawal(
        &self,
        settlement_id: SettlementId,
        reason: &str,
    ) -> Result<SettlementRequest, SettlementError> {
        let current = self
            .reconciling(settlement_id, ReconciliationCase::WithdrawalUnknown, "release withdrawal")
            .await?;
        let reason = reason.to_string();
        let failed = self
            .advance(current, SettlementEvent::WithdrawalFailed, "release withdrawal", |s| {
                s.failure_reason = Some(reason);
            })
            .await?;
        tracing::info!(settlement_id = %settlement_id, "unconfirmed withdrawal released");
        Ok(failed)
    }

    /// Complete a withdrawn settlement once its fiat payout has been made
    /// out of band.
    pub async fn resolve_inconsistent(
        &self,
        settlement_id: SettlementId,
        fiat_tx_ref: &str,
    ) -> Result<SettlementRequest, SettlementError> {
        let current = self
            .reconciling(settlement_id, ReconciliationCase::PayoutMissing, "resolve")
            .await?;
        if fiat_tx_ref.trim().is_empty() {
            return Err(CoreError::ValidationError("fiat_tx_ref is empty".into()).into());
        }
        let completed = self.complete(current, fiat_tx_ref.to_string()).await?;
        tracing::info!(settlement_id = %settlement_id, "inconsistent settlement resolved");
        Ok(completed)
    }

    /// Load a settlement and require it to be in reconciliation `case`.
    async fn reconciling(
        &self,
        settlement_id: SettlementId,
        case: ReconciliationCase,
        operation: &'static str,
    ) -> Result<SettlementRequest, SettlementError> {
        let current = self.get_settlement(settlement_id).await?;
        if current.reconciliation_case() != Some(case) {
            return Err(SettlementError::InvalidState {
                settlement_id,
                status: current.status,
                operation,
            });
        }
        Ok(current)
    }

    /// Record the payout reference and proof, then move to `completed`.
    async fn complete(
        &self,
        settlement: SettlementRequest,
        fiat_tx_ref: String,
    ) -> Result<SettlementRequest, SettlementError> {
        let settlement_id = settlement.settlement_id;
        let crypto_tx_hash = settlement.crypto_tx_hash.clone().ok_or(
            SettlementError::InvalidState {
                settlement_id,
                status: settlement.status,
                operation: "complete without a withdrawal",
            },
        )?;
        let proof = proof_hash(settlement_id, &crypto_tx_hash, &fiat_tx_ref);
        let settled_at = self.clock.now();

        let completed = self
            .advance(settlement, SettlementEvent::SettlementConfirmed, "complete", |s| {
                s.fiat_tx_ref = Some(fiat_tx_ref);
                s.proof_hash = Some(proof);
                s.failure_reason = None;
                s.settled_at = Some(settled_at);
            })
            .await?;
        tracing::info!(
            settlement_id = %settlement_id,
            fiat_tx_ref = ?completed.fiat_tx_ref,
            "settlement completed"
        );
        Ok(completed)
    }

    /// Apply `event` to `settlement`, let `update` fill in the fields that go
    /// with it, and swap the result in against the status it was loaded with.
    async fn advance<F>(
        &self,
        mut settlement: SettlementRequest,
        event: SettlementEvent,
        operation: &'static str,
        update: F,
    ) -> Result<SettlementRequest, SettlementError>
    where
        F: FnOnce(&mut SettlementRequest),
    {
        let expected = settlement.status;
        settlement.apply(event).map_err(|_| SettlementError::InvalidState {
            settlement_id: settlement.settlement_id,
            status: expected,
            operation,
        })?;
        update(&mut settlement);
        self.swap(expected, &settlement, operation).await?;
        Ok(settlement)
    }

    async fn swap(
        &self,
        expected: SettlementStatus,
        next: &SettlementRequest,
        operation: &'static str,
    ) -> Result<(), SettlementError> {
        self.store
            .compare_and_swap_settlement(expected, next)
            .await
            .map_err(|err| match err {
                StoreError::SettlementNotFound(id) => SettlementError::NotFound(id),
                StoreError::SettlementStatusMismatch { actual, .. } => {
                    SettlementError::InvalidState {
                        settlement_id: next.settlement_id,
                        status: actual,
                        operation,
                    }
                }
                other => SettlementError::Store(other),
            })
    }
}
