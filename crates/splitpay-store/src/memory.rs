use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use splitpay_core::{
    PaymentFragment, PaymentId, PaymentPlan, PlanStatus, SettlementId, SettlementRequest,
    SettlementStatus,
};

use crate::error::StoreError;
use crate::traits::{
    apply_fragment_update, apply_plan_transition, check_settlement_immutables, PlanStore,
    SettlementStore,
};

/// In-memory store.
///
/// Thread-safe: each record sits behind a `DashMap` shard lock, so read-check-
/// write sequences on one key are atomic.
pub struct MemoryStore {
    plans: DashMap<PaymentId, PaymentPlan>,
    settlements: DashMap<SettlementId, SettlementRequest>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            plans: DashMap::new(),
            settlements: DashMap::new(),
        }
    }

    pub fn plan_count(&self) -> usize {
        self.plans.len()
    }

    pub fn settlement_count(&self) -> usize {
        self.settlements.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlanStore for MemoryStore {
    async fn insert_plan(&self, plan: &PaymentPlan) -> Result<(), StoreError> {
        match self.plans.entry(plan.payment_id) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists(plan.payment_id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(plan.clone());
                Ok(())
            }
        }
    }

    async fn get_plan(&self, payment_id: PaymentId) -> Result<Option<PaymentPlan>, StoreError> {
        Ok(self.plans.get(&payment_id).map(|p| p.value().clone()))
    }

    async fn transition_plan(
        &self,
        payment_id: PaymentId,
        expected: &[PlanStatus],
        next: PlanStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<PaymentPlan, StoreError> {
        let mut entry = self
            .plans
            .get_mut(&payment_id)
            .ok_or(StoreError::PlanNotFound(payment_id))?;
        apply_plan_transition(entry.value_mut(), expected, next, completed_at)?;
        Ok(entry.value().clone())
    }

    async fn update_fragment(
        &self,
        payment_id: PaymentId,
        fragment: &PaymentFragment,
    ) -> Result<(), StoreError> {
        let mut entry = self
            .plans
            .get_mut(&payment_id)
            .ok_or(StoreError::PlanNotFound(payment_id))?;
        apply_fragment_update(entry.value_mut(), fragment)
    }

    async fn list_plans(&self) -> Result<Vec<PaymentPlan>, StoreError> {
        Ok(self.plans.iter().map(|p| p.value().clone()).collect())
    }
}

#[async_trait]
impl SettlementStore for MemoryStore {
    async fn insert_settlement(&self, settlement: &SettlementRequest) -> Result<(), StoreError> {
        match self.settlements.entry(settlement.settlement_id) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists(
                settlement.settlement_id.to_string(),
            )),
            Entry::Vacant(slot) => {
                slot.insert(settlement.clone());
                Ok(())
            }
        }
    }

    async fn get_settlement(
        &self,
        settlement_id: SettlementId,
    ) -> Result<Option<SettlementRequest>, StoreError> {
        Ok(self.settlements.get(&settlement_id).map(|s| s.value().clone()))
    }

    async fn compare_and_swap_settlement(
        &self,
        expected: SettlementStatus,
        next: &SettlementRequest,
    ) -> Result<(), StoreError> {
        let mut entry = self
            .settlements
            .get_mut(&next.settlement_id)
            .ok_or(StoreError::SettlementNotFound(next.settlement_id))?;
        let stored = entry.value_mut();
        if stored.status != expected {
            return Err(StoreError::SettlementStatusMismatch {
                expected,
                actual: stored.status,
            });
        }
        check_settlement_immutables(stored, next)?;
        *stored = next.clone();
        Ok(())
    }

    async fn list_settlements(&self) -> Result<Vec<SettlementRequest>, StoreError> {
        Ok(self.settlements.iter().map(|s| s.value().clone()).collect())
    }
}
