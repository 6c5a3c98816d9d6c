use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::payment_method::{FiatCurrency, MerchantPaymentMethod};
use crate::state_machine::{SettlementEvent, SettlementStateMachine, SettlementStatus};
use crate::types::{Amount, Chain, SettlementId, Token};

/// Why a `settling` settlement has to be looked at by an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationCase {
    /// Claimed for execution with no withdrawal hash recorded. The escrow
    /// withdrawal may or may not have landed on chain.
    WithdrawalUnknown,
    /// Crypto left escrow; no fiat payout was recorded.
    PayoutMissing,
}

/// A completed payment awaiting conversion of escrowed crypto into a fiat
/// payout to the merchant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRequest {
    pub settlement_id: SettlementId,
    pub escrow_id: String,
    pub escrow_address: String,
    pub merchant_id: String,
    pub payer_address: String,
    pub crypto_amount: Amount,
    pub token: Token,
    pub chain: Chain,
    pub merchant_payment_method: MerchantPaymentMethod,
    /// Fiat owed to the merchant, locked at queue time.
    pub fiat_amount: Amount,
    pub fiat_currency: FiatCurrency,
    /// Fiat per token unit at queue time.
    pub exchange_rate: Amount,
    pub status: SettlementStatus,
    /// End of the dispute window. Never changes after creation.
    pub dispute_period_end: DateTime<Utc>,
    pub crypto_tx_hash: Option<String>,
    pub fiat_tx_ref: Option<String>,
    pub proof_hash: Option<String>,
    pub failure_reason: Option<String>,
    pub dispute_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl SettlementRequest {
    /// Apply a state-machine event to this request's status.
    pub fn apply(&mut self, event: SettlementEvent) -> Result<SettlementStatus, CoreError> {
        self.status = SettlementStateMachine::transition(self.status, event)?;
        Ok(self.status)
    }

    /// Whether the dispute window has elapsed at `now`.
    pub fn dispute_window_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.dispute_period_end <= now
    }

    /// A `settling` settlement without a fiat reference, classified by
    /// whether its withdrawal hash was recorded. `None` for every other
    /// settlement.
    pub fn reconciliation_case(&self) -> Option<ReconciliationCase> {
        if self.status != SettlementStatus::Settling || self.fiat_tx_ref.is_some() {
            return None;
        }
        Some(match self.crypto_tx_hash {
            Some(_) => ReconciliationCase::PayoutMissing,
            None => ReconciliationCase::WithdrawalUnknown,
        })
    }

    /// `completed` requires all three settlement references.
    pub fn has_completion_proof(&self) -> bool {
        self.crypto_tx_hash.is_some() && self.fiat_tx_ref.is_some() && self.proof_hash.is_some()
    }
}
