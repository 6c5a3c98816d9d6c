//! Integration test: the full flow over the RocksDB store, including
//! reopening the database and racing two settlement workers on one store.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use rust_decimal_macros::dec;
use splitpay_core::{
    Chain, ExecutionMode, MerchantPaymentMethod, Network, PaymentTarget, PlanStatus,
    SettlementStatus,
};
use splitpay_integration_tests::{temp_dir, test_config, usdc, Sandbox};
use splitpay_settlement::SettlementOrder;
use splitpay_store::{PlanStore, RocksStore, SettlementStore};

fn sepa_order() -> SettlementOrder {
    SettlementOrder {
        escrow_id: "escrow-eu-1".into(),
        escrow_address: "0xescrow".into(),
        merchant_id: "boulangerie".into(),
        payer_address: "0xpayer".into(),
        amount: dec!(250),
        token: usdc(),
        chain: Chain::Base,
        merchant_payment_method: MerchantPaymentMethod::Sepa {
            iban: "FR76 3000 6000 0112 3456 7890 189".into(),
            account_holder: "Boulangerie Dupont".into(),
        },
    }
}

#[tokio::test]
async fn test_flow_survives_reopen() {
    let dir = temp_dir();
    let (payment_id, settlement_id) = {
        let store = Arc::new(RocksStore::open(&dir).unwrap());
        let sandbox = Sandbox::new(store.clone(), test_config());
        sandbox
            .ledger
            .register_wallet(Chain::Base, Network::Mainnet, "0xpayer", None)
            .unwrap();
        sandbox
            .balances
            .set_token_balance(Chain::Base, "0xpayer", &usdc(), dec!(300));
        sandbox.ledger.refresh_all().await;

        let plan = sandbox
            .planner
            .create_plan(
                PaymentTarget {
                    merchant_id: "boulangerie".into(),
                    payment_method_ids: vec!["sepa-1".into()],
                    escrow_address: "0xescrow".into(),
                },
                dec!(250),
                &usdc(),
                &sandbox.ledger.get_wallets_with_token(&usdc()),
                &sandbox.config.planner,
            )
            .await
            .unwrap();
        sandbox
            .executor
            .execute_plan(plan.payment_id, ExecutionMode::Sequential, Duration::ZERO)
            .await
            .unwrap();

        let settlement = sandbox.queue.queue_settlement(sepa_order()).await.unwrap();
        assert_eq!(settlement.fiat_amount, dec!(230));
        (plan.payment_id, settlement.settlement_id)
    };

    let store = Arc::new(RocksStore::open(&dir).unwrap());
    let plan = store.get_plan(payment_id).await.unwrap().unwrap();
    assert_eq!(plan.status, PlanStatus::Completed);
    assert!(plan.fragments[0].transaction_hash.is_some());

    let stored = store.get_settlement(settlement_id).await.unwrap().unwrap();
    assert_eq!(stored.status, SettlementStatus::Pending);

    // A new worker picks the queue up after the window closes.
    let sandbox = Sandbox::new(store.clone(), test_config());
    sandbox.clock.set(stored.dispute_period_end);
    let report = sandbox.queue.process_ready_settlements().await.unwrap();
    assert_eq!(report.completed(), 1);

    let done = store.get_settlement(settlement_id).await.unwrap().unwrap();
    assert_eq!(done.status, SettlementStatus::Completed);
    assert_eq!(done.dispute_period_end, stored.dispute_period_end);
    assert!(done.has_completion_proof());

    drop(sandbox);
    drop(store);
    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_competing_sweeps_withdraw_once() {
    let dir = temp_dir();
    let store = Arc::new(RocksStore::open(&dir).unwrap());
    let first = Arc::new(Sandbox::new(store.clone(), test_config()));
    let second = Arc::new(Sandbox::new(store.clone(), test_config()));
    for sandbox in [&first, &second] {
        sandbox
            .chain
            .delay_withdrawals(Some(Duration::from_millis(30)));
    }

    let mut ids = Vec::new();
    for _ in 0..4 {
        ids.push(first.queue.queue_settlement(sepa_order()).await.unwrap().settlement_id);
    }
    first.clock.advance(ChronoDuration::hours(72));
    second.clock.advance(ChronoDuration::hours(72));

    let a = {
        let sandbox = Arc::clone(&first);
        tokio::spawn(async move { sandbox.queue.process_ready_settlements().await })
    };
    let b = {
        let sandbox = Arc::clone(&second);
        tokio::spawn(async move { sandbox.queue.process_ready_settlements().await })
    };
    let report_a = a.await.unwrap().unwrap();
    let report_b = b.await.unwrap().unwrap();

    assert_eq!(report_a.completed() + report_b.completed(), 4);
    assert_eq!(
        first.chain.withdrawal_count() + second.chain.withdrawal_count(),
        4
    );
    assert_eq!(first.fiat.payouts().len() + second.fiat.payouts().len(), 4);
    for id in ids {
        let settlement = store.get_settlement(id).await.unwrap().unwrap();
        assert_eq!(settlement.status, SettlementStatus::Completed);
    }

    drop(first);
    drop(second);
    drop(store);
    std::fs::remove_dir_all(&dir).ok();
}
