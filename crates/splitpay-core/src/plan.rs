use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;
use crate::types::{Amount, Chain, Network, PaymentId, Token, WalletId};

/// Status of a single fragment transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FragmentStatus {
    /// Not yet submitted (or awaiting a retry).
    Pending,
    /// Transfer confirmed on chain.
    Confirmed,
    /// Transfer failed; see the fragment's error.
    Failed,
}

impl FragmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed)
    }
}

impl fmt::Display for FragmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Confirmed => write!(f, "confirmed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Lifecycle status of a payment plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    /// Created, not yet executed.
    Planning,
    /// Fragments are being submitted.
    Executing,
    /// At least one fragment confirmed. Inspect fragments for failures.
    Completed,
    /// No fragment confirmed.
    Failed,
}

impl PlanStatus {
    /// Valid transitions:
    /// - Planning → Executing
    /// - Executing → Completed | Failed
    /// - Completed | Failed → Executing (explicit retry of failed fragments)
    pub fn can_transition_to(&self, next: PlanStatus) -> bool {
        matches!(
            (self, next),
            (Self::Planning, Self::Executing)
                | (Self::Executing, Self::Completed)
                | (Self::Executing, Self::Failed)
                | (Self::Completed, Self::Executing)
                | (Self::Failed, Self::Executing)
        )
    }

    pub fn transition(self, next: PlanStatus) -> Result<PlanStatus, CoreError> {
        if self.can_transition_to(next) {
            tracing::debug!(from = %self, to = %next, "plan state transition");
            Ok(next)
        } else {
            Err(CoreError::InvalidPlanTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Planning => write!(f, "planning"),
            Self::Executing => write!(f, "executing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// The merchant side of a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTarget {
    pub merchant_id: String,
    /// Identifiers of the merchant's registered payout methods.
    pub payment_method_ids: Vec<String>,
    /// Escrow contract every fragment pays into.
    pub escrow_address: String,
}

/// A single-wallet, single-chain portion of a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentFragment {
    /// Position within the plan.
    pub index: usize,
    pub wallet_id: WalletId,
    pub chain: Chain,
    pub network: Network,
    pub address: String,
    pub amount: Amount,
    pub token: Token,
    pub gas_estimate: Amount,
    pub status: FragmentStatus,
    pub transaction_hash: Option<String>,
    pub error: Option<String>,
}

/// A logical payment split into ordered fragments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentPlan {
    pub payment_id: PaymentId,
    pub target: PaymentTarget,
    pub total_amount: Amount,
    pub target_token: Token,
    pub fragments: Vec<PaymentFragment>,
    pub status: PlanStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PaymentPlan {
    pub fn success_count(&self) -> usize {
        self.count(FragmentStatus::Confirmed)
    }

    pub fn failure_count(&self) -> usize {
        self.count(FragmentStatus::Failed)
    }

    pub fn pending_count(&self) -> usize {
        self.count(FragmentStatus::Pending)
    }

    fn count(&self, status: FragmentStatus) -> usize {
        self.fragments.iter().filter(|f| f.status == status).count()
    }

    /// Sum of fragment amounts.
    pub fn allocated_amount(&self) -> Amount {
        self.fragments.iter().map(|f| f.amount).sum()
    }

    /// Sum of confirmed fragment amounts.
    pub fn confirmed_amount(&self) -> Amount {
        self.fragments
            .iter()
            .filter(|f| f.status == FragmentStatus::Confirmed)
            .map(|f| f.amount)
            .sum()
    }

    /// Total estimated gas over all fragments.
    pub fn total_gas_estimate(&self) -> Amount {
        self.fragments.iter().map(|f| f.gas_estimate).sum()
    }

    /// Final plan status once every fragment is terminal: `Failed` if nothing
    /// confirmed, `Completed` otherwise (possibly with failed fragments).
    /// Returns `None` while any fragment is still pending.
    pub fn resolved_status(&self) -> Option<PlanStatus> {
        if self.pending_count() > 0 {
            return None;
        }
        if self.success_count() == 0 {
            Some(PlanStatus::Failed)
        } else {
            Some(PlanStatus::Completed)
        }
    }

    /// Whether every fragment confirmed.
    pub fn is_fully_paid(&self) -> bool {
        !self.fragments.is_empty() && self.success_count() == self.fragments.len()
    }
}
