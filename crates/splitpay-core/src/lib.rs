//! SplitPay core: domain types, configuration, error taxonomy, state
//! machines, and the collaborator interfaces the rest of the workspace is
//! written against.

pub mod clock;
pub mod config;
pub mod error;
pub mod payment_method;
pub mod plan;
pub mod sandbox;
pub mod settlement;
pub mod state_machine;
pub mod telemetry;
pub mod traits;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    ExecutionMode, ExecutorConfig, LedgerConfig, LoggingConfig, PlanConstraints, SettlementConfig,
    SplitPayConfig, StorageConfig,
};
pub use error::{CollaboratorError, CoreError, ErrorKind};
pub use payment_method::{FiatCurrency, MerchantPaymentMethod};
pub use plan::{FragmentStatus, PaymentFragment, PaymentPlan, PaymentTarget, PlanStatus};
pub use settlement::{ReconciliationCase, SettlementRequest};
pub use state_machine::{SettlementEvent, SettlementStateMachine, SettlementStatus};
pub use traits::{with_timeout, BalanceProvider, ChainClient, FiatRail, GasEstimator, PriceOracle};
pub use types::{Amount, Balances, Chain, Network, PaymentId, SettlementId, Token, WalletId};
