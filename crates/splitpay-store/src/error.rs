use splitpay_core::{PaymentId, PlanStatus, SettlementId, SettlementStatus};

/// Persistence-layer errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("plan not found: {0}")]
    PlanNotFound(PaymentId),

    #[error("settlement not found: {0}")]
    SettlementNotFound(SettlementId),

    #[error("record already exists: {0}")]
    AlreadyExists(String),

    #[error("plan status mismatch: expected one of {expected:?}, found {actual}")]
    PlanStatusMismatch {
        expected: Vec<PlanStatus>,
        actual: PlanStatus,
    },

    #[error("settlement status mismatch: expected {expected}, found {actual}")]
    SettlementStatusMismatch {
        expected: SettlementStatus,
        actual: SettlementStatus,
    },

    #[error("fragment index {index} out of range for plan {payment_id}")]
    FragmentOutOfRange { payment_id: PaymentId, index: usize },

    #[error("attempt to modify immutable field: {0}")]
    ImmutableField(&'static str),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<rocksdb::Error> for StoreError {
    fn from(err: rocksdb::Error) -> Self {
        Self::Backend(err.to_string())
    }
}
