use std::time::Duration;

use crate::plan::PlanStatus;
use crate::state_machine::SettlementStatus;

/// Core validation and state errors.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    ValidationError(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid payment method: {0}")]
    InvalidPaymentMethod(String),

    #[error("unsupported chain: {0}")]
    UnsupportedChain(String),

    #[error("invalid settlement state transition from {from} on {event}")]
    InvalidSettlementTransition {
        from: SettlementStatus,
        event: String,
    },

    #[error("invalid plan state transition from {from} to {to}")]
    InvalidPlanTransition { from: PlanStatus, to: PlanStatus },

    #[error("configuration error: {0}")]
    Config(String),
}

/// Failure reported by an external collaborator (balance provider, chain
/// client, fiat rail, price oracle, gas estimator).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    /// Transient unavailability; safe to retry.
    #[error("{service} unavailable: {reason}")]
    Unavailable { service: String, reason: String },

    /// The call exceeded its deadline; safe to retry.
    #[error("{service} timed out after {elapsed:?}")]
    Timeout { service: String, elapsed: Duration },

    /// Definitive rejection (reverted transaction, refused payout, ...).
    #[error("{service} rejected the request: {reason}")]
    Rejected { service: String, reason: String },
}

impl CollaboratorError {
    pub fn unavailable(service: &str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            service: service.to_string(),
            reason: reason.into(),
        }
    }

    pub fn rejected(service: &str, reason: impl Into<String>) -> Self {
        Self::Rejected {
            service: service.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Timeout { .. })
    }
}

/// Coarse classification shared by every crate-level error, so callers can
/// branch on the failure category without matching each crate's enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input; nothing was persisted.
    Validation,
    /// The planner could not cover the requested amount.
    InsufficientFunds,
    /// Operation attempted from the wrong state.
    InvalidState,
    /// Transient dependency failure; retryable.
    ProviderUnavailable,
    /// On-chain failure; the unit is marked failed.
    Chain,
    /// Crypto left escrow but fiat was not paid; needs manual reconciliation.
    Inconsistent,
    /// Persistence or other internal failure.
    Internal,
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidSettlementTransition { .. } | Self::InvalidPlanTransition { .. } => {
                ErrorKind::InvalidState
            }
            Self::Config(_) => ErrorKind::Internal,
            _ => ErrorKind::Validation,
        }
    }
}
