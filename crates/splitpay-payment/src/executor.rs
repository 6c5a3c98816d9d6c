use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use splitpay_core::{
    with_timeout, ChainClient, Clock, ExecutionMode, ExecutorConfig, FragmentStatus,
    PaymentFragment, PaymentId, PaymentPlan, PlanStatus, WalletId,
};
use splitpay_store::{PlanStore, StoreError};
use tokio::task::JoinSet;

use crate::error::PaymentError;

/// Result of submitting a single fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentOutcome {
    pub index: usize,
    pub wallet_id: WalletId,
    pub status: FragmentStatus,
    pub transaction_hash: Option<String>,
    pub error: Option<String>,
    /// Whether the failure was transient (timeout, unavailable).
    pub retryable: bool,
    /// Whether the outcome reached the plan store. An unpersisted outcome
    /// leaves its fragment `pending` in storage.
    pub persisted: bool,
}

/// Per-plan execution record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub plan_id: PaymentId,
    pub plan_status: PlanStatus,
    pub success_count: usize,
    pub failure_count: usize,
    /// Fragments still `pending` in storage. Non-zero only when outcomes
    /// could not be persisted; the plan then stays `executing`.
    pub pending_count: usize,
    /// Outcome of every fragment submitted in this run, in plan order.
    pub fragments: Vec<FragmentOutcome>,
}

impl ExecutionSummary {
    /// Every fragment of the plan confirmed.
    pub fn is_fully_paid(&self) -> bool {
        self.failure_count == 0 && self.pending_count == 0 && self.success_count > 0
    }
}

/// Submits plan fragments to the chain client.
///
/// Each fragment succeeds or fails on its own: a failed or timed-out
/// submission, or a store error while recording it, never prevents the
/// remaining fragments from being attempted. Every outcome is persisted as
/// soon as it is known.
pub struct FragmentExecutor {
    chain: Arc<dyn ChainClient>,
    store: Arc<dyn PlanStore>,
    clock: Arc<dyn Clock>,
    submit_timeout: Duration,
}

impl FragmentExecutor {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        store: Arc<dyn PlanStore>,
        clock: Arc<dyn Clock>,
        submit_timeout: Duration,
    ) -> Self {
        Self {
            chain,
            store,
            clock,
            submit_timeout,
        }
    }

    pub fn from_config(
        chain: Arc<dyn ChainClient>,
        store: Arc<dyn PlanStore>,
        clock: Arc<dyn Clock>,
        config: &ExecutorConfig,
    ) -> Self {
        Self::new(chain, store, clock, config.submit_timeout())
    }

    /// Execute every fragment of a plan in `planning` status.
    pub async fn execute_plan(
        &self,
        payment_id: PaymentId,
        mode: ExecutionMode,
        inter_fragment_delay: Duration,
    ) -> Result<ExecutionSummary, PaymentError> {
        let plan = self
            .claim(payment_id, &[PlanStatus::Planning], "plan is not in planning")
            .await?;
        tracing::info!(
            payment_id = %payment_id,
            fragments = plan.fragments.len(),
            mode = ?mode,
            "executing payment plan"
        );

        let pending: Vec<PaymentFragment> = plan.fragments.clone();
        self.run(&plan, pending, mode, inter_fragment_delay).await
    }

    /// Re-submit only the failed fragments of a finished plan.
    ///
    /// Confirmed fragments are left alone; the plan status is recomputed
    /// over all fragments once the retried ones land.
    pub async fn retry_failed(
        &self,
        payment_id: PaymentId,
        mode: ExecutionMode,
        inter_fragment_delay: Duration,
    ) -> Result<ExecutionSummary, PaymentError> {
        let current = self
            .store
            .get_plan(payment_id)
            .await?
            .ok_or(PaymentError::PlanNotFound(payment_id))?;
        if !matches!(current.status, PlanStatus::Completed | PlanStatus::Failed) {
            return Err(PaymentError::InvalidState {
                payment_id,
                status: current.status,
                reason: "plan is not finished",
            });
        }
        if current.failure_count() == 0 {
            return Err(PaymentError::InvalidState {
                payment_id,
                status: current.status,
                reason: "plan has no failed fragments",
            });
        }

        let plan = self
            .claim(
                payment_id,
                &[PlanStatus::Completed, PlanStatus::Failed],
                "plan is not finished",
            )
            .await?;
        let failed: Vec<PaymentFragment> = plan
            .fragments
            .iter()
            .filter(|f| f.status == FragmentStatus::Failed)
            .cloned()
            .collect();
        tracing::info!(payment_id = %payment_id, fragments = failed.len(), "retrying failed fragments");

        self.run(&plan, failed, mode, inter_fragment_delay).await
    }

    /// Pick up a plan left in `executing` by an interrupted run.
    ///
    /// Only fragments still `pending` in storage are submitted; confirmed and
    /// failed ones are left alone. The plan status is then resolved over all
    /// fragments. Callers should first settle any outcome an earlier run
    /// reported as unpersisted, since its fragment is still `pending` here.
    pub async fn resume_plan(
        &self,
        payment_id: PaymentId,
        mode: ExecutionMode,
        inter_fragment_delay: Duration,
    ) -> Result<ExecutionSummary, PaymentError> {
        let plan = self
            .store
            .get_plan(payment_id)
            .await?
            .ok_or(PaymentError::PlanNotFound(payment_id))?;
        if plan.status != PlanStatus::Executing {
            return Err(PaymentError::InvalidState {
                payment_id,
                status: plan.status,
                reason: "plan is not executing",
            });
        }
        let pending: Vec<PaymentFragment> = plan
            .fragments
            .iter()
            .filter(|f| f.status == FragmentStatus::Pending)
            .cloned()
            .collect();
        tracing::warn!(payment_id = %payment_id, fragments = pending.len(), "resuming interrupted plan");

        self.run(&plan, pending, mode, inter_fragment_delay).await
    }

    /// Atomically move the plan into `executing`.
    async fn claim(
        &self,
        payment_id: PaymentId,
        expected: &[PlanStatus],
        reason: &'static str,
    ) -> Result<PaymentPlan, PaymentError> {
        self.store
            .transition_plan(payment_id, expected, PlanStatus::Executing, None)
            .await
            .map_err(|err| match err {
                StoreError::PlanNotFound(id) => PaymentError::PlanNotFound(id),
                StoreError::PlanStatusMismatch { actual, .. } => PaymentError::InvalidState {
                    payment_id,
                    status: actual,
                    reason,
                },
                other => PaymentError::Store(other),
            })
    }

    async fn run(
        &self,
        plan: &PaymentPlan,
        fragments: Vec<PaymentFragment>,
        mode: ExecutionMode,
        inter_fragment_delay: Duration,
    ) -> Result<ExecutionSummary, PaymentError> {
        let mut outcomes = match mode {
            ExecutionMode::Sequential => {
                self.run_sequential(plan, fragments, inter_fragment_delay)
                    .await?
            }
            ExecutionMode::Parallel => self.run_parallel(plan, fragments).await?,
        };
        outcomes.sort_by_key(|o| o.index);
        self.finish(plan.payment_id, outcomes).await
    }

    async fn run_sequential(
        &self,
        plan: &PaymentPlan,
        fragments: Vec<PaymentFragment>,
        inter_fragment_delay: Duration,
    ) -> Result<Vec<FragmentOutcome>, PaymentError> {
        let mut outcomes = Vec::with_capacity(fragments.len());
        for (n, fragment) in fragments.into_iter().enumerate() {
            if n > 0 && !inter_fragment_delay.is_zero() {
                tokio::time::sleep(inter_fragment_delay).await;
            }
            let outcome = submit_fragment(
                Arc::clone(&self.chain),
                Arc::clone(&self.store),
                self.submit_timeout,
                plan.payment_id,
                plan.target.escrow_address.clone(),
                fragment,
            )
            .await;
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    async fn run_parallel(
        &self,
        plan: &PaymentPlan,
        fragments: Vec<PaymentFragment>,
    ) -> Result<Vec<FragmentOutcome>, PaymentError> {
        let mut tasks = JoinSet::new();
        for fragment in fragments {
            tasks.spawn(submit_fragment(
                Arc::clone(&self.chain),
                Arc::clone(&self.store),
                self.submit_timeout,
                plan.payment_id,
                plan.target.escrow_address.clone(),
                fragment,
            ));
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        let mut first_error = None;
        // Drain every task before reporting an error so no submission is
        // left running unobserved.
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(join_err) => {
                    first_error.get_or_insert(PaymentError::TaskFailed(join_err.to_string()));
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(outcomes),
        }
    }

    /// Resolve the plan's final status from the stored fragments.
    ///
    /// Outcomes that could not be persisted are written once more first. If
    /// any fragment is still `pending` after that, the plan stays
    /// `executing` for [`resume_plan`](Self::resume_plan).
    async fn finish(
        &self,
        payment_id: PaymentId,
        mut outcomes: Vec<FragmentOutcome>,
    ) -> Result<ExecutionSummary, PaymentError> {
        let mut plan = self
            .store
            .get_plan(payment_id)
            .await?
            .ok_or(PaymentError::PlanNotFound(payment_id))?;

        for outcome in outcomes.iter_mut().filter(|o| !o.persisted) {
            let Some(stored) = plan.fragments.get_mut(outcome.index) else {
                continue;
            };
            let mut fragment = stored.clone();
            fragment.status = outcome.status;
            fragment.transaction_hash = outcome.transaction_hash.clone();
            fragment.error = outcome.error.clone();
            match self.store.update_fragment(payment_id, &fragment).await {
                Ok(()) => {
                    *stored = fragment;
                    outcome.persisted = true;
                }
                Err(err) => tracing::error!(
                    payment_id = %payment_id,
                    index = outcome.index,
                    status = %outcome.status,
                    tx_hash = ?outcome.transaction_hash,
                    error = %err,
                    "fragment outcome could not be persisted"
                ),
            }
        }

        let Some(resolved) = plan.resolved_status() else {
            tracing::warn!(
                payment_id = %payment_id,
                pending = plan.pending_count(),
                "plan left executing with unrecorded fragments"
            );
            return Ok(ExecutionSummary {
                plan_id: payment_id,
                plan_status: plan.status,
                success_count: plan.success_count(),
                failure_count: plan.failure_count(),
                pending_count: plan.pending_count(),
                fragments: outcomes,
            });
        };
        let final_status = plan.status.transition(resolved)?;
        let plan = self
            .store
            .transition_plan(
                payment_id,
                &[PlanStatus::Executing],
                final_status,
                Some(self.clock.now()),
            )
            .await?;

        let summary = ExecutionSummary {
            plan_id: payment_id,
            plan_status: plan.status,
            success_count: plan.success_count(),
            failure_count: plan.failure_count(),
            pending_count: plan.pending_count(),
            fragments: outcomes,
        };
        tracing::info!(
            payment_id = %payment_id,
            status = %summary.plan_status,
            succeeded = summary.success_count,
            failed = summary.failure_count,
            "payment plan finished"
        );
        Ok(summary)
    }
}

/// Submit one fragment and persist its outcome. A store error is logged and
/// reported through [`FragmentOutcome::persisted`].
async fn submit_fragment(
    chain: Arc<dyn ChainClient>,
    store: Arc<dyn PlanStore>,
    submit_timeout: Duration,
    payment_id: PaymentId,
    escrow_address: String,
    mut fragment: PaymentFragment,
) -> FragmentOutcome {
    let result = with_timeout(
        "chain-client",
        submit_timeout,
        chain.submit_transfer(
            fragment.chain,
            fragment.network,
            &fragment.address,
            &escrow_address,
            fragment.amount,
            &fragment.token,
        ),
    )
    .await;

    let retryable = match result {
        Ok(tx_hash) => {
            tracing::debug!(payment_id = %payment_id, index = fragment.index, tx_hash = %tx_hash, "fragment confirmed");
            fragment.status = FragmentStatus::Confirmed;
            fragment.transaction_hash = Some(tx_hash);
            fragment.error = None;
            false
        }
        Err(err) => {
            tracing::warn!(
                payment_id = %payment_id,
                index = fragment.index,
                chain = %fragment.chain,
                error = %err,
                "fragment failed"
            );
            fragment.status = FragmentStatus::Failed;
            fragment.transaction_hash = None;
            fragment.error = Some(err.to_string());
            err.is_retryable()
        }
    };
    let persisted = match store.update_fragment(payment_id, &fragment).await {
        Ok(()) => true,
        Err(err) => {
            tracing::error!(
                payment_id = %payment_id,
                index = fragment.index,
                error = %err,
                "failed to persist fragment outcome"
            );
            false
        }
    };

    FragmentOutcome {
        index: fragment.index,
        wallet_id: fragment.wallet_id,
        status: fragment.status,
        transaction_hash: fragment.transaction_hash,
        error: fragment.error,
        retryable,
        persisted,
    }
}
