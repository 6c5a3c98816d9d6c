use std::fmt;

use crate::error::CoreError;

/// The lifecycle states of a settlement request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementStatus {
    /// Queued; the dispute window is still open.
    Pending,
    /// Dispute window elapsed without a dispute; eligible for execution.
    Ready,
    /// Execution claimed. Crypto withdrawal and fiat payout in progress, or
    /// crypto withdrawn but fiat not delivered (needs reconciliation).
    Settling,
    /// Crypto withdrawn, fiat delivered, proof recorded. Final state.
    Completed,
    /// A party disputed the payment during the window. Final state.
    Disputed,
    /// Escrow withdrawal failed; may be requeued.
    Failed,
    /// Cancelled before execution. Final state.
    Cancelled,
}

impl SettlementStatus {
    /// Whether this is a final (terminal) state.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Completed | Self::Disputed | Self::Cancelled)
    }

    pub const ALL: [SettlementStatus; 7] = [
        Self::Pending,
        Self::Ready,
        Self::Settling,
        Self::Completed,
        Self::Disputed,
        Self::Failed,
        Self::Cancelled,
    ];
}

impl fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Ready => write!(f, "ready"),
            Self::Settling => write!(f, "settling"),
            Self::Completed => write!(f, "completed"),
            Self::Disputed => write!(f, "disputed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Events that drive settlement transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementEvent {
    /// The dispute window closed with no dispute raised.
    DisputeWindowElapsed,
    /// A party contested the payment.
    DisputeRaised,
    /// The payer or operator withdrew the request before execution.
    Cancelled,
    /// An executor claimed the settlement.
    ExecutionStarted,
    /// Withdrawal and fiat payout both succeeded.
    SettlementConfirmed,
    /// The escrow withdrawal failed.
    WithdrawalFailed,
    /// Operator re-queued a failed settlement.
    Requeued,
}

impl fmt::Display for SettlementEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Settlement state transitions.
///
/// Valid transitions:
/// - Pending → Ready (DisputeWindowElapsed)
/// - Pending → Disputed (DisputeRaised)
/// - Pending → Cancelled (Cancelled)
/// - Ready → Settling (ExecutionStarted)
/// - Settling → Completed (SettlementConfirmed)
/// - Settling → Failed (WithdrawalFailed)
/// - Failed → Ready (Requeued)
pub struct SettlementStateMachine;

impl SettlementStateMachine {
    /// Attempt a state transition based on an event.
    pub fn transition(
        current: SettlementStatus,
        event: SettlementEvent,
    ) -> Result<SettlementStatus, CoreError> {
        let next = match (current, event) {
            (SettlementStatus::Pending, SettlementEvent::DisputeWindowElapsed) => {
                SettlementStatus::Ready
            }
            (SettlementStatus::Pending, SettlementEvent::DisputeRaised) => {
                SettlementStatus::Disputed
            }
            (SettlementStatus::Pending, SettlementEvent::Cancelled) => SettlementStatus::Cancelled,

            (SettlementStatus::Ready, SettlementEvent::ExecutionStarted) => {
                SettlementStatus::Settling
            }

            (SettlementStatus::Settling, SettlementEvent::SettlementConfirmed) => {
                SettlementStatus::Completed
            }
            (SettlementStatus::Settling, SettlementEvent::WithdrawalFailed) => {
                SettlementStatus::Failed
            }

            (SettlementStatus::Failed, SettlementEvent::Requeued) => SettlementStatus::Ready,

            _ => {
                return Err(CoreError::InvalidSettlementTransition {
                    from: current,
                    event: event.to_string(),
                })
            }
        };

        tracing::debug!(
            from = %current,
            to = %next,
            event = ?event,
            "settlement state transition"
        );

        Ok(next)
    }

    /// Check if a transition is valid without performing it.
    pub fn can_transition(current: SettlementStatus, event: SettlementEvent) -> bool {
        Self::transition(current, event).is_ok()
    }
}
