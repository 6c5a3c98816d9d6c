//! Integration test: a configuration saved to TOML and loaded back drives
//! every component the same way the builder does.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use rust_decimal_macros::dec;
use splitpay_core::telemetry::init_tracing;
use splitpay_core::{
    Chain, ExecutionMode, MerchantPaymentMethod, Network, PaymentTarget, SettlementStatus,
    SplitPayConfig,
};
use splitpay_integration_tests::{temp_dir, usdc, Sandbox};
use splitpay_payment::PaymentError;
use splitpay_settlement::{SettlementError, SettlementOrder};
use splitpay_store::{MemoryStore, RocksStore};

fn brl_order(chain: Chain) -> SettlementOrder {
    SettlementOrder {
        escrow_id: "escrow-br".into(),
        escrow_address: "0xescrow".into(),
        merchant_id: "padaria".into(),
        payer_address: "0xpayer".into(),
        amount: dec!(40),
        token: usdc(),
        chain,
        merchant_payment_method: MerchantPaymentMethod::Pix {
            pix_key: "padaria@pix.com.br".into(),
        },
    }
}

fn custom_config() -> SplitPayConfig {
    SplitPayConfig::builder()
        .max_fragments(2)
        .min_fragment(dec!(5))
        .execution_mode(ExecutionMode::Parallel)
        .inter_fragment_delay(Duration::ZERO)
        .submit_timeout(Duration::from_millis(250))
        .balance_timeout(Duration::from_millis(250))
        .external_call_timeout(Duration::from_millis(250))
        .dispute_period_hours(24)
        .settlement_fee_percentage(dec!(1.5))
        .supported_chains(vec![Chain::Polygon, Chain::Base])
        .log_format("json")
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_saved_config_drives_components() {
    let dir = temp_dir();
    let path = dir.join("conf").join("splitpay.toml");
    custom_config().save(&path).unwrap();

    let loaded = SplitPayConfig::load(&path).unwrap();
    assert_eq!(loaded, custom_config());
    assert_eq!(loaded.logging.format, "json");

    let sandbox = Sandbox::new(Arc::new(MemoryStore::new()), loaded);

    // Settlement window follows `dispute_period_hours`.
    let settlement = sandbox
        .queue
        .queue_settlement(brl_order(Chain::Polygon))
        .await
        .unwrap();
    assert_eq!(
        settlement.dispute_period_end - settlement.created_at,
        ChronoDuration::hours(24)
    );
    assert_eq!(settlement.fiat_amount, dec!(200));

    let err = sandbox
        .queue
        .queue_settlement(brl_order(Chain::Ethereum))
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::Core(_)));

    sandbox.clock.advance(ChronoDuration::hours(24));
    let report = sandbox.queue.process_ready_settlements().await.unwrap();
    assert_eq!(report.completed(), 1);
    let stats = sandbox.queue.get_settlement_stats().await.unwrap();
    assert_eq!(stats.count(SettlementStatus::Completed), 1);
    assert_eq!(stats.total_fees, dec!(0.6));

    // Planner honours the fragment cap from the file.
    for address in ["0x1", "0x2", "0x3"] {
        sandbox
            .ledger
            .register_wallet(Chain::Base, Network::Mainnet, address, None)
            .unwrap();
        sandbox
            .balances
            .set_token_balance(Chain::Base, address, &usdc(), dec!(10));
    }
    sandbox.ledger.refresh_all().await;
    let err = sandbox
        .planner
        .create_plan(
            PaymentTarget {
                merchant_id: "padaria".into(),
                payment_method_ids: vec!["pix-1".into()],
                escrow_address: "0xescrow".into(),
            },
            dec!(25),
            &usdc(),
            &sandbox.ledger.get_wallets_with_token(&usdc()),
            &sandbox.config.planner,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::InsufficientFunds { .. }));

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_missing_file_loads_defaults_and_opens_store() {
    let dir = temp_dir();
    let loaded = SplitPayConfig::load(&dir.join("absent.toml")).unwrap();
    assert_eq!(loaded, SplitPayConfig::default());
    assert_eq!(loaded.settlement.dispute_period_hours, 72);

    let config = SplitPayConfig::builder()
        .data_dir(dir.join("db"))
        .build()
        .unwrap();
    let store = Arc::new(RocksStore::open(&config.storage.data_dir).unwrap());
    let sandbox = Sandbox::new(store, config);
    let settlement = sandbox
        .queue
        .queue_settlement(brl_order(Chain::Base))
        .await
        .unwrap();
    assert_eq!(
        settlement.dispute_period_end - settlement.created_at,
        ChronoDuration::hours(72)
    );

    drop(sandbox);
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_invalid_file_is_rejected() {
    let dir = temp_dir();
    let path = dir.join("bad.toml");
    std::fs::write(&path, "[settlement]\nsettlement_fee_percentage = \"120\"\n").unwrap();
    assert!(SplitPayConfig::load(&path).is_err());

    std::fs::write(&path, "[logging]\nformat = \"xml\"\n").unwrap();
    assert!(SplitPayConfig::load(&path).is_err());

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_tracing_installs_once() {
    let config = custom_config();
    init_tracing(&config.logging);
    assert!(!init_tracing(&config.logging));
}
