//! RocksDB storage backend.
//!
//! Records are JSON-encoded under `plan:<id>` and `settlement:<id>` keys.
//! Every read-check-write runs inside a pessimistic transaction that locks the
//! key with `get_for_update`, so status swaps stay atomic across tasks sharing
//! the same database handle.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{Direction, IteratorMode, Options, TransactionDB, TransactionDBOptions};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

use splitpay_core::{
    PaymentFragment, PaymentId, PaymentPlan, PlanStatus, SettlementId, SettlementRequest,
    SettlementStatus,
};

use crate::error::StoreError;
use crate::traits::{
    apply_fragment_update, apply_plan_transition, check_settlement_immutables, PlanStore,
    SettlementStore,
};

const PLAN_PREFIX: &str = "plan:";
const SETTLEMENT_PREFIX: &str = "settlement:";

/// RocksDB-backed store.
pub struct RocksStore {
    db: TransactionDB,
}

fn plan_key(id: PaymentId) -> String {
    format!("{}{}", PLAN_PREFIX, id)
}

fn settlement_key(id: SettlementId) -> String {
    format!("{}{}", SETTLEMENT_PREFIX, id)
}

impl RocksStore {
    /// Open or create a database at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(path)
            .map_err(|e| StoreError::Backend(format!("create {}: {}", path.display(), e)))?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        let txn_opts = TransactionDBOptions::default();

        let db = TransactionDB::open(&opts, &txn_opts, path)?;
        tracing::info!(path = %path.display(), "rocksdb store opened");
        Ok(Self { db })
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.db.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Insert `value` under `key` unless the key already exists.
    fn insert_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let txn = self.db.transaction();
        if txn.get_for_update(key.as_bytes(), true)?.is_some() {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }
        txn.put(key.as_bytes(), serde_json::to_vec(value)?)?;
        txn.commit()?;
        Ok(())
    }

    /// Lock `key`, let `update` mutate the decoded record, and write it back
    /// in one transaction. Nothing is written if `update` fails.
    fn update_json<T, F>(&self, key: &str, missing: StoreError, update: F) -> Result<T, StoreError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut T) -> Result<(), StoreError>,
    {
        let txn = self.db.transaction();
        let bytes = txn.get_for_update(key.as_bytes(), true)?.ok_or(missing)?;
        let mut record: T = serde_json::from_slice(&bytes)?;
        update(&mut record)?;
        txn.put(key.as_bytes(), serde_json::to_vec(&record)?)?;
        txn.commit()?;
        Ok(record)
    }

    fn scan_json<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>, StoreError> {
        let mut records = Vec::new();
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }
}

#[async_trait]
impl PlanStore for RocksStore {
    async fn insert_plan(&self, plan: &PaymentPlan) -> Result<(), StoreError> {
        self.insert_json(&plan_key(plan.payment_id), plan)
    }

    async fn get_plan(&self, payment_id: PaymentId) -> Result<Option<PaymentPlan>, StoreError> {
        self.get_json(&plan_key(payment_id))
    }

    async fn transition_plan(
        &self,
        payment_id: PaymentId,
        expected: &[PlanStatus],
        next: PlanStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<PaymentPlan, StoreError> {
        self.update_json(
            &plan_key(payment_id),
            StoreError::PlanNotFound(payment_id),
            |plan: &mut PaymentPlan| apply_plan_transition(plan, expected, next, completed_at),
        )
    }

    async fn update_fragment(
        &self,
        payment_id: PaymentId,
        fragment: &PaymentFragment,
    ) -> Result<(), StoreError> {
        self.update_json(
            &plan_key(payment_id),
            StoreError::PlanNotFound(payment_id),
            |plan: &mut PaymentPlan| apply_fragment_update(plan, fragment),
        )
        .map(|_| ())
    }

    async fn list_plans(&self) -> Result<Vec<PaymentPlan>, StoreError> {
        self.scan_json(PLAN_PREFIX)
    }
}

#[async_trait]
impl SettlementStore for RocksStore {
    async fn insert_settlement(&self, settlement: &SettlementRequest) -> Result<(), StoreError> {
        self.insert_json(&settlement_key(settlement.settlement_id), settlement)
    }

    async fn get_settlement(
        &self,
        settlement_id: SettlementId,
    ) -> Result<Option<SettlementRequest>, StoreError> {
        self.get_json(&settlement_key(settlement_id))
    }

    async fn compare_and_swap_settlement(
        &self,
        expected: SettlementStatus,
        next: &SettlementRequest,
    ) -> Result<(), StoreError> {
        self.update_json(
            &settlement_key(next.settlement_id),
            StoreError::SettlementNotFound(next.settlement_id),
            |stored: &mut SettlementRequest| {
                if stored.status != expected {
                    return Err(StoreError::SettlementStatusMismatch {
                        expected,
                        actual: stored.status,
                    });
                }
                check_settlement_immutables(stored, next)?;
                *stored = next.clone();
                Ok(())
            },
        )
        .map(|_| ())
    }

    async fn list_settlements(&self) -> Result<Vec<SettlementRequest>, StoreError> {
        self.scan_json(SETTLEMENT_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_plan, sample_settlement};
    use splitpay_core::FragmentStatus;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("splitpay-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_open_storage() {
        let dir = temp_dir();
        let storage = RocksStore::open(&dir);
        assert!(storage.is_ok());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_plan_roundtrip_and_fragment_update() {
        let dir = temp_dir();
        let store = RocksStore::open(&dir).unwrap();
        let plan = sample_plan();
        store.insert_plan(&plan).await.unwrap();
        assert!(matches!(
            store.insert_plan(&plan).await,
            Err(StoreError::AlreadyExists(_))
        ));

        let mut update = plan.fragments[0].clone();
        update.status = FragmentStatus::Failed;
        update.error = Some("reverted".into());
        store.update_fragment(plan.payment_id, &update).await.unwrap();

        let stored = store.get_plan(plan.payment_id).await.unwrap().unwrap();
        assert_eq!(stored.fragments[0].status, FragmentStatus::Failed);
        assert_eq!(stored.fragments[0].error.as_deref(), Some("reverted"));
        assert_eq!(store.list_plans().await.unwrap().len(), 1);

        drop(store);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let dir = temp_dir();
        let store = RocksStore::open(&dir).unwrap();
        assert!(store.get_plan(PaymentId::new()).await.unwrap().is_none());
        assert!(store
            .get_settlement(SettlementId::new())
            .await
            .unwrap()
            .is_none());
        drop(store);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_settlement_cas_and_scan() {
        let dir = temp_dir();
        let store = RocksStore::open(&dir).unwrap();
        let mut settlement = sample_settlement();
        settlement.status = SettlementStatus::Ready;
        store.insert_settlement(&settlement).await.unwrap();
        store.insert_settlement(&sample_settlement()).await.unwrap();
        store.insert_plan(&sample_plan()).await.unwrap();

        let mut claimed = settlement.clone();
        claimed.status = SettlementStatus::Settling;
        store
            .compare_and_swap_settlement(SettlementStatus::Ready, &claimed)
            .await
            .unwrap();
        assert!(matches!(
            store
                .compare_and_swap_settlement(SettlementStatus::Ready, &claimed)
                .await,
            Err(StoreError::SettlementStatusMismatch { .. })
        ));

        let all = store.list_settlements().await.unwrap();
        assert_eq!(all.len(), 2);

        drop(store);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_cas_single_winner() {
        let dir = temp_dir();
        let store = Arc::new(RocksStore::open(&dir).unwrap());
        let mut settlement = sample_settlement();
        settlement.status = SettlementStatus::Ready;
        store.insert_settlement(&settlement).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let mut claimed = settlement.clone();
            claimed.status = SettlementStatus::Settling;
            handles.push(tokio::spawn(async move {
                store
                    .compare_and_swap_settlement(SettlementStatus::Ready, &claimed)
                    .await
                    .is_ok()
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);

        drop(store);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let dir = temp_dir();
        let settlement = sample_settlement();
        {
            let store = RocksStore::open(&dir).unwrap();
            store.insert_settlement(&settlement).await.unwrap();
        }
        let store = RocksStore::open(&dir).unwrap();
        let loaded = store
            .get_settlement(settlement.settlement_id)
            .await
            .unwrap();
        assert_eq!(loaded, Some(settlement));
        drop(store);
        std::fs::remove_dir_all(&dir).ok();
    }
}
