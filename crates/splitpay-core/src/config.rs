//! Configuration loading, validation, and building.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::CoreError;
use crate::types::{Amount, Chain};

/// Full configuration for a SplitPay deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SplitPayConfig {
    /// Fragment allocation constraints.
    #[serde(default)]
    pub planner: PlanConstraints,

    /// Fragment execution settings.
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Wallet ledger settings.
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Settlement queue settings.
    #[serde(default)]
    pub settlement: SettlementConfig,

    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Limits applied when splitting a payment into fragments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanConstraints {
    /// Smallest fragment worth submitting (dust threshold).
    #[serde(default)]
    pub min_fragment: Amount,
    /// Maximum number of fragments in one plan.
    #[serde(default = "default_max_fragments")]
    pub max_fragments: usize,
}

/// How a plan's fragments are submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One at a time in plan order, pausing between submissions.
    #[default]
    Sequential,
    /// All fragments at once as independent tasks.
    Parallel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default)]
    pub mode: ExecutionMode,
    /// Pause between sequential submissions, in milliseconds.
    #[serde(default = "default_inter_fragment_delay_ms")]
    pub inter_fragment_delay_ms: u64,
    /// Deadline for a single chain submission, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub submit_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Deadline for a balance refresh, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub balance_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementConfig {
    /// Length of the dispute window.
    #[serde(default = "default_dispute_period_hours")]
    pub dispute_period_hours: u32,
    /// Fee charged on settled volume, in percent (0.5 = 0.5%).
    #[serde(default = "default_fee_percentage")]
    pub settlement_fee_percentage: Decimal,
    /// Chains escrows may live on.
    #[serde(default = "default_supported_chains")]
    pub supported_chains: Vec<Chain>,
    /// Deadline for oracle, chain and fiat-rail calls, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub external_call_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the data directory.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json).
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_max_fragments() -> usize {
    10
}
fn default_inter_fragment_delay_ms() -> u64 {
    1_000
}
fn default_timeout_ms() -> u64 {
    30_000
}
fn default_dispute_period_hours() -> u32 {
    72
}
fn default_fee_percentage() -> Decimal {
    Decimal::new(5, 1)
}
fn default_supported_chains() -> Vec<Chain> {
    vec![
        Chain::Ethereum,
        Chain::Polygon,
        Chain::Arbitrum,
        Chain::Optimism,
        Chain::Base,
        Chain::Solana,
    ]
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "text".into()
}

impl Default for PlanConstraints {
    fn default() -> Self {
        Self {
            min_fragment: Decimal::ZERO,
            max_fragments: default_max_fragments(),
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::default(),
            inter_fragment_delay_ms: default_inter_fragment_delay_ms(),
            submit_timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            balance_timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            dispute_period_hours: default_dispute_period_hours(),
            settlement_fee_percentage: default_fee_percentage(),
            supported_chains: default_supported_chains(),
            external_call_timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl PlanConstraints {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.max_fragments == 0 {
            return Err(CoreError::Config("max_fragments must be at least 1".into()));
        }
        if self.min_fragment.is_sign_negative() {
            return Err(CoreError::Config(format!(
                "min_fragment must not be negative, got {}",
                self.min_fragment
            )));
        }
        Ok(())
    }
}

impl ExecutorConfig {
    pub fn inter_fragment_delay(&self) -> Duration {
        Duration::from_millis(self.inter_fragment_delay_ms)
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }
}

impl LedgerConfig {
    pub fn balance_timeout(&self) -> Duration {
        Duration::from_millis(self.balance_timeout_ms)
    }
}

impl SettlementConfig {
    pub fn dispute_period(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.dispute_period_hours))
    }

    pub fn external_call_timeout(&self) -> Duration {
        Duration::from_millis(self.external_call_timeout_ms)
    }

    pub fn is_chain_supported(&self, chain: Chain) -> bool {
        self.supported_chains.contains(&chain)
    }

    /// Fee on `amount` at the configured percentage.
    pub fn fee_for(&self, amount: Amount) -> Amount {
        amount * self.settlement_fee_percentage / Decimal::ONE_HUNDRED
    }
}

impl SplitPayConfig {
    /// Start building a validated configuration from defaults.
    pub fn builder() -> SplitPayConfigBuilder {
        SplitPayConfigBuilder::default()
    }

    /// Load config from a TOML file, falling back to defaults when the file
    /// does not exist. The result is validated.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| CoreError::Config(format!("read {}: {}", path.display(), e)))?;
            toml::from_str::<SplitPayConfig>(&contents)
                .map_err(|e| CoreError::Config(format!("parse {}: {}", path.display(), e)))?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Save the current config to a TOML file.
    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| CoreError::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CoreError::Config(format!("create {}: {}", parent.display(), e)))?;
        }
        std::fs::write(path, contents)
            .map_err(|e| CoreError::Config(format!("write {}: {}", path.display(), e)))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        self.planner.validate()?;

        if self.executor.submit_timeout_ms == 0 {
            return Err(CoreError::Config("executor.submit_timeout_ms must be > 0".into()));
        }
        if self.ledger.balance_timeout_ms == 0 {
            return Err(CoreError::Config("ledger.balance_timeout_ms must be > 0".into()));
        }

        let settlement = &self.settlement;
        if settlement.external_call_timeout_ms == 0 {
            return Err(CoreError::Config(
                "settlement.external_call_timeout_ms must be > 0".into(),
            ));
        }
        if settlement.settlement_fee_percentage.is_sign_negative()
            || settlement.settlement_fee_percentage > Decimal::ONE_HUNDRED
        {
            return Err(CoreError::Config(format!(
                "settlement_fee_percentage must be within [0, 100], got {}",
                settlement.settlement_fee_percentage
            )));
        }
        if settlement.supported_chains.is_empty() {
            return Err(CoreError::Config("supported_chains must not be empty".into()));
        }

        match self.logging.format.as_str() {
            "text" | "json" => Ok(()),
            other => Err(CoreError::Config(format!(
                "logging.format must be text or json, got {}",
                other
            ))),
        }
    }
}

/// Builder for [`SplitPayConfig`]; `build()` validates the result.
#[derive(Debug, Clone, Default)]
pub struct SplitPayConfigBuilder {
    config: SplitPayConfig,
}

impl SplitPayConfigBuilder {
    pub fn min_fragment(mut self, amount: Amount) -> Self {
        self.config.planner.min_fragment = amount;
        self
    }

    pub fn max_fragments(mut self, max: usize) -> Self {
        self.config.planner.max_fragments = max;
        self
    }

    pub fn execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.config.executor.mode = mode;
        self
    }

    pub fn inter_fragment_delay(mut self, delay: Duration) -> Self {
        self.config.executor.inter_fragment_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn submit_timeout(mut self, timeout: Duration) -> Self {
        self.config.executor.submit_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn balance_timeout(mut self, timeout: Duration) -> Self {
        self.config.ledger.balance_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn dispute_period_hours(mut self, hours: u32) -> Self {
        self.config.settlement.dispute_period_hours = hours;
        self
    }

    pub fn settlement_fee_percentage(mut self, percentage: Decimal) -> Self {
        self.config.settlement.settlement_fee_percentage = percentage;
        self
    }

    pub fn supported_chains(mut self, chains: Vec<Chain>) -> Self {
        self.config.settlement.supported_chains = chains;
        self
    }

    pub fn external_call_timeout(mut self, timeout: Duration) -> Self {
        self.config.settlement.external_call_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.storage.data_dir = dir.into();
        self
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    pub fn log_format(mut self, format: &str) -> Self {
        self.config.logging.format = format.to_string();
        self
    }

    pub fn build(self) -> Result<SplitPayConfig, CoreError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
