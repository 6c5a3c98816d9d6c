use async_trait::async_trait;
use chrono::{DateTime, Utc};
use splitpay_core::{
    PaymentFragment, PaymentId, PaymentPlan, PlanStatus, SettlementId, SettlementRequest,
    SettlementStatus,
};

use crate::error::StoreError;

/// Durable storage for payment plans.
///
/// Writes to a single plan are serialized by the implementation, so
/// concurrent fragment updates never lose each other.
#[async_trait]
pub trait PlanStore: Send + Sync {
    /// Persist a new plan. Fails with `AlreadyExists` on a duplicate id.
    async fn insert_plan(&self, plan: &PaymentPlan) -> Result<(), StoreError>;

    async fn get_plan(&self, payment_id: PaymentId) -> Result<Option<PaymentPlan>, StoreError>;

    /// Atomically move a plan from one of `expected` to `next`, recording
    /// `completed_at`. Fails with `PlanStatusMismatch` if the stored status is
    /// not one of `expected`.
    async fn transition_plan(
        &self,
        payment_id: PaymentId,
        expected: &[PlanStatus],
        next: PlanStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<PaymentPlan, StoreError>;

    /// Record a fragment's status, transaction hash and error. Every other
    /// fragment field is immutable.
    async fn update_fragment(
        &self,
        payment_id: PaymentId,
        fragment: &PaymentFragment,
    ) -> Result<(), StoreError>;

    async fn list_plans(&self) -> Result<Vec<PaymentPlan>, StoreError>;
}

/// Durable storage for settlement requests with an atomic status swap.
#[async_trait]
pub trait SettlementStore: Send + Sync {
    /// Persist a new settlement. Fails with `AlreadyExists` on a duplicate id.
    async fn insert_settlement(&self, settlement: &SettlementRequest) -> Result<(), StoreError>;

    async fn get_settlement(
        &self,
        settlement_id: SettlementId,
    ) -> Result<Option<SettlementRequest>, StoreError>;

    /// Replace the stored settlement with `next` only if its status is still
    /// `expected`. This is the mutual-exclusion primitive guarding execution:
    /// of two concurrent swaps from the same status, exactly one succeeds and
    /// the other fails with `SettlementStatusMismatch`.
    async fn compare_and_swap_settlement(
        &self,
        expected: SettlementStatus,
        next: &SettlementRequest,
    ) -> Result<(), StoreError>;

    async fn list_settlements(&self) -> Result<Vec<SettlementRequest>, StoreError>;
}

/// Apply a fragment update onto the stored plan, touching only the mutable
/// fields.
pub(crate) fn apply_fragment_update(
    plan: &mut PaymentPlan,
    update: &PaymentFragment,
) -> Result<(), StoreError> {
    let payment_id = plan.payment_id;
    let stored = plan
        .fragments
        .get_mut(update.index)
        .ok_or(StoreError::FragmentOutOfRange {
            payment_id,
            index: update.index,
        })?;
    if stored.wallet_id != update.wallet_id || stored.amount != update.amount {
        return Err(StoreError::ImmutableField("fragment allocation"));
    }
    stored.status = update.status;
    stored.transaction_hash = update.transaction_hash.clone();
    stored.error = update.error.clone();
    Ok(())
}

/// Reject swaps that would rewrite creation-time settlement fields.
pub(crate) fn check_settlement_immutables(
    stored: &SettlementRequest,
    next: &SettlementRequest,
) -> Result<(), StoreError> {
    if stored.dispute_period_end != next.dispute_period_end {
        return Err(StoreError::ImmutableField("dispute_period_end"));
    }
    if stored.created_at != next.created_at {
        return Err(StoreError::ImmutableField("created_at"));
    }
    if stored.fiat_amount != next.fiat_amount || stored.crypto_amount != next.crypto_amount {
        return Err(StoreError::ImmutableField("amounts"));
    }
    Ok(())
}

/// Validate and apply a plan transition onto a loaded plan.
pub(crate) fn apply_plan_transition(
    plan: &mut PaymentPlan,
    expected: &[PlanStatus],
    next: PlanStatus,
    completed_at: Option<DateTime<Utc>>,
) -> Result<(), StoreError> {
    if !expected.contains(&plan.status) {
        return Err(StoreError::PlanStatusMismatch {
            expected: expected.to_vec(),
            actual: plan.status,
        });
    }
    plan.status = next;
    plan.completed_at = completed_at;
    Ok(())
}
