use splitpay_core::{CollaboratorError, CoreError, ErrorKind, SettlementId, SettlementStatus};
use splitpay_store::StoreError;

/// Settlement-layer errors.
#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("settlement not found: {0}")]
    NotFound(SettlementId),

    #[error("cannot {operation} settlement {settlement_id} in status {status}")]
    InvalidState {
        settlement_id: SettlementId,
        status: SettlementStatus,
        operation: &'static str,
    },

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(#[source] CollaboratorError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SettlementError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::Validation,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::ProviderUnavailable(_) => ErrorKind::ProviderUnavailable,
            Self::Core(err) => err.kind(),
            Self::Store(_) => ErrorKind::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ProviderUnavailable(source) => source.is_retryable(),
            _ => false,
        }
    }
}
