//! Integration test: wallet ledger → planner → executor → settlement queue,
//! all over the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use rust_decimal_macros::dec;
use splitpay_core::{
    Chain, CollaboratorError, ExecutionMode, FragmentStatus, MerchantPaymentMethod, Network,
    PaymentTarget, PlanStatus, ReconciliationCase, SettlementStatus,
};
use splitpay_integration_tests::{test_config, usdc, Sandbox};
use splitpay_payment::PaymentError;
use splitpay_settlement::{SettlementFilter, SettlementOrder, SettlementOutcome};
use splitpay_store::{MemoryStore, PlanStore};

fn target() -> PaymentTarget {
    PaymentTarget {
        merchant_id: "chai-stall-42".into(),
        payment_method_ids: vec!["upi-primary".into()],
        escrow_address: "0xescrow".into(),
    }
}

fn settlement_order(amount: rust_decimal::Decimal) -> SettlementOrder {
    SettlementOrder {
        escrow_id: "escrow-7".into(),
        escrow_address: "0xescrow".into(),
        merchant_id: "chai-stall-42".into(),
        payer_address: "0xa".into(),
        amount,
        token: usdc(),
        chain: Chain::Polygon,
        merchant_payment_method: MerchantPaymentMethod::Upi {
            upi_id: "chai@okicici".into(),
        },
    }
}

// =========================================================================
// Plan and execute
// =========================================================================

#[tokio::test]
async fn test_two_wallet_split_end_to_end() {
    let store = Arc::new(MemoryStore::new());
    let sandbox = Sandbox::new(store.clone(), test_config());

    let a = sandbox
        .ledger
        .register_wallet(Chain::Polygon, Network::Mainnet, "0xa", Some("main".into()))
        .unwrap();
    let b = sandbox
        .ledger
        .register_wallet(Chain::Arbitrum, Network::Mainnet, "0xb", None)
        .unwrap();
    sandbox
        .balances
        .set_token_balance(Chain::Polygon, "0xa", &usdc(), dec!(60));
    sandbox
        .balances
        .set_token_balance(Chain::Arbitrum, "0xb", &usdc(), dec!(50));
    assert!(sandbox.ledger.refresh_all().await.is_complete());

    let candidates = sandbox.ledger.get_wallets_with_token(&usdc());
    let plan = sandbox
        .planner
        .create_plan(
            target(),
            dec!(100),
            &usdc(),
            &candidates,
            &sandbox.config.planner,
        )
        .await
        .unwrap();
    let split: Vec<_> = plan
        .fragments
        .iter()
        .map(|f| (f.wallet_id, f.amount))
        .collect();
    assert_eq!(split, vec![(a, dec!(60)), (b, dec!(40))]);

    let summary = sandbox
        .executor
        .execute_plan(plan.payment_id, ExecutionMode::Sequential, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(summary.plan_status, PlanStatus::Completed);
    assert!(summary.is_fully_paid());

    let transfers = sandbox.chain.transfers();
    assert_eq!(transfers.len(), 2);
    assert!(transfers.iter().all(|t| t.to == "0xescrow"));
    assert_eq!(transfers[0].chain, Chain::Polygon);
    assert_eq!(transfers[1].chain, Chain::Arbitrum);

    // Payment landed in escrow; queue the fiat settlement.
    let queued = sandbox
        .queue
        .queue_settlement(settlement_order(plan.confirmed_amount()))
        .await
        .unwrap();
    assert_eq!(queued.status, SettlementStatus::Pending);
    assert_eq!(queued.fiat_amount, dec!(8300));

    sandbox.clock.advance(ChronoDuration::hours(71));
    let report = sandbox.queue.process_ready_settlements().await.unwrap();
    assert!(report.outcomes.is_empty());

    sandbox.clock.advance(ChronoDuration::hours(1));
    let report = sandbox.queue.process_ready_settlements().await.unwrap();
    assert_eq!(report.promoted, vec![queued.settlement_id]);
    match &report.outcomes[..] {
        [SettlementOutcome::Completed(done)] => {
            assert!(done.has_completion_proof());
            assert_eq!(done.settled_at, Some(queued.dispute_period_end));
        }
        other => panic!("expected one completed settlement, got {:?}", other),
    }
    assert_eq!(sandbox.fiat.payouts()[0].amount, dec!(8300));

    let stats = sandbox.queue.get_settlement_stats().await.unwrap();
    assert_eq!(stats.count(SettlementStatus::Completed), 1);
    assert_eq!(stats.total_fees, dec!(0.5));
}

#[tokio::test]
async fn test_parallel_partial_failure_and_retry() {
    let store = Arc::new(MemoryStore::new());
    let sandbox = Sandbox::new(store.clone(), test_config());
    for (address, balance) in [("0x1", dec!(30)), ("0x2", dec!(30)), ("0x3", dec!(30))] {
        sandbox
            .ledger
            .register_wallet(Chain::Base, Network::Mainnet, address, None)
            .unwrap();
        sandbox
            .balances
            .set_token_balance(Chain::Base, address, &usdc(), balance);
    }
    sandbox.ledger.refresh_all().await;
    sandbox
        .chain
        .fail_sender("0x2", CollaboratorError::unavailable("chain", "mempool full"));

    let candidates = sandbox.ledger.get_wallets_with_token(&usdc());
    let plan = sandbox
        .planner
        .create_plan(target(), dec!(75), &usdc(), &candidates, &sandbox.config.planner)
        .await
        .unwrap();
    assert_eq!(plan.fragments.len(), 3);

    let summary = sandbox
        .executor
        .execute_plan(plan.payment_id, ExecutionMode::Parallel, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(summary.success_count, 2);
    assert_eq!(summary.failure_count, 1);
    assert_eq!(summary.plan_status, PlanStatus::Completed);
    let failed = summary
        .fragments
        .iter()
        .find(|o| o.status == FragmentStatus::Failed)
        .unwrap();
    assert!(failed.retryable);

    let stored = store.get_plan(plan.payment_id).await.unwrap().unwrap();
    assert!(!stored.is_fully_paid());
    assert_eq!(stored.confirmed_amount(), dec!(45));

    sandbox.chain.clear_sender_failure("0x2");
    let retried = sandbox
        .executor
        .retry_failed(plan.payment_id, ExecutionMode::Sequential, Duration::ZERO)
        .await
        .unwrap();
    assert!(retried.is_fully_paid());
    let stored = store.get_plan(plan.payment_id).await.unwrap().unwrap();
    assert_eq!(stored.confirmed_amount(), dec!(75));
}

#[tokio::test]
async fn test_insufficient_funds_leaves_no_plan() {
    let store = Arc::new(MemoryStore::new());
    let sandbox = Sandbox::new(store.clone(), test_config());
    sandbox
        .ledger
        .register_wallet(Chain::Optimism, Network::Mainnet, "0xpoor", None)
        .unwrap();
    sandbox
        .balances
        .set_token_balance(Chain::Optimism, "0xpoor", &usdc(), dec!(12.5));
    sandbox.ledger.refresh_all().await;

    let err = sandbox
        .planner
        .create_plan(
            target(),
            dec!(20),
            &usdc(),
            &sandbox.ledger.get_wallets_with_token(&usdc()),
            &sandbox.config.planner,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::InsufficientFunds { remaining, .. } if remaining == dec!(7.5)));
    assert_eq!(store.plan_count(), 0);
    assert!(sandbox.chain.transfers().is_empty());
}

#[tokio::test]
async fn test_provider_outage_keeps_last_known_balances() {
    let store = Arc::new(MemoryStore::new());
    let sandbox = Sandbox::new(store, test_config());
    let id = sandbox
        .ledger
        .register_wallet(Chain::Solana, Network::Mainnet, "SoLaddr", None)
        .unwrap();
    sandbox
        .balances
        .set_token_balance(Chain::Solana, "SoLaddr", &usdc(), dec!(40));
    sandbox.ledger.refresh_all().await;

    sandbox
        .balances
        .fail_address("SoLaddr", CollaboratorError::unavailable("rpc", "503"));
    let report = sandbox.ledger.refresh_all().await;
    assert_eq!(report.failed.len(), 1);

    let wallet = sandbox.ledger.get_wallet(id).unwrap();
    assert_eq!(wallet.balance_of(&usdc()), dec!(40));
    assert_eq!(sandbox.ledger.get_wallets_with_token(&usdc()).len(), 1);
}

// =========================================================================
// Settlement edge cases across the queue
// =========================================================================

#[tokio::test]
async fn test_dispute_blocks_settlement() {
    let store = Arc::new(MemoryStore::new());
    let sandbox = Sandbox::new(store, test_config());
    let settlement = sandbox
        .queue
        .queue_settlement(settlement_order(dec!(20)))
        .await
        .unwrap();
    sandbox
        .queue
        .raise_dispute(settlement.settlement_id, "wrong order")
        .await
        .unwrap();

    sandbox.clock.advance(ChronoDuration::hours(73));
    let report = sandbox.queue.process_ready_settlements().await.unwrap();
    assert!(report.outcomes.is_empty());
    assert_eq!(sandbox.chain.withdrawal_count(), 0);

    let disputed = sandbox
        .queue
        .list_settlements(&SettlementFilter::default().with_status(SettlementStatus::Disputed))
        .await
        .unwrap();
    assert_eq!(disputed.len(), 1);
}

#[tokio::test]
async fn test_fiat_outage_surfaces_for_reconciliation() {
    let store = Arc::new(MemoryStore::new());
    let sandbox = Sandbox::new(store, test_config());
    let settlement = sandbox
        .queue
        .queue_settlement(settlement_order(dec!(10)))
        .await
        .unwrap();
    sandbox
        .fiat
        .fail_transfers(Some(CollaboratorError::unavailable("upi", "switch down")));
    sandbox.clock.advance(ChronoDuration::hours(72));

    let report = sandbox.queue.process_ready_settlements().await.unwrap();
    assert_eq!(report.needs_reconciliation(), 1);
    for _ in 0..3 {
        sandbox.queue.process_ready_settlements().await.unwrap();
    }
    assert_eq!(sandbox.chain.withdrawal_count(), 1);

    let pending_reconciliation = sandbox.queue.list_inconsistent().await.unwrap();
    assert_eq!(
        pending_reconciliation[0].settlement.settlement_id,
        settlement.settlement_id
    );
    assert_eq!(pending_reconciliation[0].case, ReconciliationCase::PayoutMissing);
    let resolved = sandbox
        .queue
        .resolve_inconsistent(settlement.settlement_id, "UPI-OPS-1")
        .await
        .unwrap();
    assert_eq!(resolved.status, SettlementStatus::Completed);
}
