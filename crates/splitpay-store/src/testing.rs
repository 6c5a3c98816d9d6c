use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use splitpay_core::{
    Chain, FiatCurrency, FragmentStatus, MerchantPaymentMethod, Network, PaymentFragment,
    PaymentId, PaymentPlan, PaymentTarget, PlanStatus, SettlementId, SettlementRequest,
    SettlementStatus, Token, WalletId,
};

pub fn sample_plan() -> PaymentPlan {
    let usdc = Token::new("USDC").unwrap();
    let fragments = [dec!(60), dec!(40)]
        .into_iter()
        .enumerate()
        .map(|(index, amount)| PaymentFragment {
            index,
            wallet_id: WalletId::new(),
            chain: Chain::Polygon,
            network: Network::Mainnet,
            address: format!("0xwallet{}", index),
            amount,
            token: usdc.clone(),
            gas_estimate: dec!(0.02),
            status: FragmentStatus::Pending,
            transaction_hash: None,
            error: None,
        })
        .collect();

    PaymentPlan {
        payment_id: PaymentId::new(),
        target: PaymentTarget {
            merchant_id: "merchant-1".into(),
            payment_method_ids: vec!["upi-main".into()],
            escrow_address: "0xescrow".into(),
        },
        total_amount: dec!(100),
        target_token: usdc,
        fragments,
        status: PlanStatus::Planning,
        created_at: Utc::now(),
        completed_at: None,
    }
}

pub fn sample_settlement() -> SettlementRequest {
    let created_at = Utc::now();
    SettlementRequest {
        settlement_id: SettlementId::new(),
        escrow_id: "escrow-1".into(),
        escrow_address: "0xescrow".into(),
        merchant_id: "merchant-1".into(),
        payer_address: "0xpayer".into(),
        crypto_amount: dec!(100),
        token: Token::new("USDC").unwrap(),
        chain: Chain::Arbitrum,
        merchant_payment_method: MerchantPaymentMethod::Upi {
            upi_id: "x@y".into(),
        },
        fiat_amount: dec!(8300),
        fiat_currency: FiatCurrency::INR,
        exchange_rate: dec!(83),
        status: SettlementStatus::Pending,
        dispute_period_end: created_at + Duration::hours(72),
        crypto_tx_hash: None,
        fiat_tx_ref: None,
        proof_hash: None,
        failure_reason: None,
        dispute_reason: None,
        created_at,
        settled_at: None,
    }
}
