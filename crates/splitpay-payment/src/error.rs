use rust_decimal::Decimal;
use splitpay_core::{CollaboratorError, CoreError, ErrorKind, PaymentId, PlanStatus, Token};
use splitpay_store::StoreError;

/// Errors raised while planning or executing a fragmented payment.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("no candidate wallet holds {token}")]
    NoEligibleWallets { token: Token },

    #[error("insufficient funds: {remaining} of {requested} left unallocated")]
    InsufficientFunds {
        requested: Decimal,
        remaining: Decimal,
    },

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(#[source] CollaboratorError),

    #[error("plan not found: {0}")]
    PlanNotFound(PaymentId),

    #[error("plan {payment_id} is {status}: {reason}")]
    InvalidState {
        payment_id: PaymentId,
        status: PlanStatus,
        reason: &'static str,
    },

    #[error("fragment task failed: {0}")]
    TaskFailed(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PaymentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoEligibleWallets { .. } => ErrorKind::Validation,
            Self::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            Self::ProviderUnavailable(_) => ErrorKind::ProviderUnavailable,
            Self::PlanNotFound(_) => ErrorKind::Validation,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::Core(err) => err.kind(),
            Self::TaskFailed(_) | Self::Store(_) => ErrorKind::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ProviderUnavailable(source) => source.is_retryable(),
            _ => false,
        }
    }
}
