use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use splitpay_core::{
    Amount, Chain, MerchantPaymentMethod, ReconciliationCase, SettlementId, SettlementRequest,
    SettlementStatus, Token,
};

/// A completed payment to be settled in fiat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementOrder {
    pub escrow_id: String,
    pub escrow_address: String,
    pub merchant_id: String,
    pub payer_address: String,
    pub amount: Amount,
    pub token: Token,
    pub chain: Chain,
    pub merchant_payment_method: MerchantPaymentMethod,
}

/// What happened when a ready settlement was executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SettlementOutcome {
    /// Crypto withdrawn, fiat paid, proof recorded.
    Completed(SettlementRequest),
    /// The chain rejected the escrow withdrawal; no fiat was attempted. The
    /// settlement is `failed` and may be requeued.
    WithdrawalFailed {
        settlement: SettlementRequest,
        reason: String,
    },
    /// The withdrawal call timed out or the chain client was unavailable, so
    /// the withdrawal may still land. The settlement stays `settling` with no
    /// hash until an operator confirms or releases it.
    WithdrawalUnconfirmed {
        settlement: SettlementRequest,
        reason: String,
    },
    /// Crypto left escrow but the fiat payout failed. The settlement stays
    /// `settling` and must be reconciled by hand; it is never retried
    /// automatically.
    Inconsistent {
        settlement: SettlementRequest,
        reason: String,
    },
}

impl SettlementOutcome {
    pub fn settlement(&self) -> &SettlementRequest {
        match self {
            Self::Completed(settlement) => settlement,
            Self::WithdrawalFailed { settlement, .. } => settlement,
            Self::WithdrawalUnconfirmed { settlement, .. } => settlement,
            Self::Inconsistent { settlement, .. } => settlement,
        }
    }

    pub fn settlement_id(&self) -> SettlementId {
        self.settlement().settlement_id
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// The settlement was left `settling` for an operator.
    pub fn needs_reconciliation(&self) -> bool {
        matches!(
            self,
            Self::Inconsistent { .. } | Self::WithdrawalUnconfirmed { .. }
        )
    }
}

/// A `settling` settlement awaiting an operator, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub case: ReconciliationCase,
    pub settlement: SettlementRequest,
}

/// Filter for listing settlements. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettlementFilter {
    pub status: Option<SettlementStatus>,
    pub merchant_id: Option<String>,
    pub chain: Option<Chain>,
    pub limit: Option<usize>,
}

impl SettlementFilter {
    pub fn with_status(mut self, status: SettlementStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_merchant(mut self, merchant_id: impl Into<String>) -> Self {
        self.merchant_id = Some(merchant_id.into());
        self
    }

    pub fn with_chain(mut self, chain: Chain) -> Self {
        self.chain = Some(chain);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, settlement: &SettlementRequest) -> bool {
        self.status.map_or(true, |s| settlement.status == s)
            && self
                .merchant_id
                .as_deref()
                .map_or(true, |m| settlement.merchant_id == m)
            && self.chain.map_or(true, |c| settlement.chain == c)
    }
}

/// Aggregate view of the settlement queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementStats {
    /// Count per status; every status is present, possibly with zero.
    pub by_status: BTreeMap<SettlementStatus, usize>,
    pub total_settlements: usize,
    /// Crypto volume of completed settlements.
    pub total_volume: Amount,
    /// Fees charged on completed settlements.
    pub total_fees: Amount,
    /// Completed crypto volume per token.
    pub volume_by_token: BTreeMap<Token, Amount>,
}

impl SettlementStats {
    pub fn count(&self, status: SettlementStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

/// Result of one settlement sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Pending settlements whose dispute window elapsed and were promoted.
    pub promoted: Vec<SettlementId>,
    /// Outcome of every settlement executed during the sweep.
    pub outcomes: Vec<SettlementOutcome>,
    /// Settlements another worker changed first.
    pub skipped: Vec<SettlementId>,
    /// Settlements whose execution hit an internal error.
    pub errors: Vec<(SettlementId, String)>,
}

impl SweepReport {
    pub fn completed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_completed()).count()
    }

    /// Executions left `settling` for reconciliation.
    pub fn needs_reconciliation(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.needs_reconciliation())
            .count()
    }
}
