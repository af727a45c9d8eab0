//! Configuration module for the delivery engine
//!
//! This module handles all configuration loading from TOML files,
//! environment variables, and provides structured configuration types.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use solana_sdk::commitment_config::CommitmentConfig;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::DeliveryError;
use crate::types::{FeeTier, MAX_COMPUTE_UNIT_LIMIT};

/// Main delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Ledger node connection
    #[serde(default)]
    pub rpc: RpcConfig,

    /// Compute sizing and priority-fee pricing
    #[serde(default)]
    pub fees: FeeConfig,

    /// Fast-path resubmission window
    #[serde(default)]
    pub broadcast: BroadcastConfig,

    /// Confirmation polling
    #[serde(default)]
    pub confirmation: ConfirmationConfig,

    /// Validated fallback send
    #[serde(default)]
    pub fallback: FallbackConfig,

    #[serde(default)]
    pub wallet: WalletConfig,

    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_url")]
    pub url: String,

    /// Commitment used for queries (processed, confirmed, finalized)
    #[serde(default = "default_commitment")]
    pub commitment: String,

    /// Request timeout in seconds
    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,
}

/// Priority-fee pricing strategy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeStrategyKind {
    /// Percentile over the node's recent prioritization fees
    #[default]
    Local,
    /// Third-party estimation service
    External,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    #[serde(default)]
    pub strategy: FeeStrategyKind,

    /// Tier used when the caller does not choose one
    #[serde(default)]
    pub default_tier: FeeTier,

    /// Unit limit used when simulation gives no usable estimate
    #[serde(default = "default_unit_limit")]
    pub default_unit_limit: u32,

    /// Additive margin over simulated consumption
    #[serde(default = "default_safety_margin_units")]
    pub safety_margin_units: u32,

    /// Multiplicative margin over simulated consumption
    #[serde(default = "default_safety_multiplier")]
    pub safety_multiplier: f64,

    #[serde(default = "default_max_unit_limit")]
    pub max_unit_limit: u32,

    /// Samples older than this many slots are stale (one epoch)
    #[serde(default = "default_max_sample_age_slots")]
    pub max_sample_age_slots: u64,

    #[serde(default)]
    pub external: ExternalFeeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalFeeConfig {
    /// JSON-RPC endpoint of the estimation service
    #[serde(default)]
    pub url: Option<String>,

    /// API key appended as `api-key` query parameter
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_external_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Overall fast-path budget in seconds
    #[serde(default = "default_broadcast_window")]
    pub window_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_poll_window")]
    pub poll_window_secs: u64,

    /// Status re-check cadence while waiting on checkpoint expiry
    #[serde(default = "default_confirm_until_interval_ms")]
    pub confirm_until_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// Node-side retry count for the validated send
    #[serde(default = "default_fallback_max_retries")]
    pub max_retries: usize,

    #[serde(default = "default_preflight_commitment")]
    pub preflight_commitment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Path to keypair file
    #[serde(default = "default_keypair_path")]
    pub keypair_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub enable_metrics: bool,

    /// Emit JSON log lines instead of the pretty format
    #[serde(default)]
    pub json_logs: bool,
}

// Default value functions
fn default_rpc_url() -> String { "https://api.mainnet-beta.solana.com".to_string() }
fn default_commitment() -> String { "confirmed".to_string() }
fn default_rpc_timeout() -> u64 { 30 }
fn default_unit_limit() -> u32 { 200_000 }
fn default_safety_margin_units() -> u32 { 100_000 }
fn default_safety_multiplier() -> f64 { 1.2 }
fn default_max_unit_limit() -> u32 { MAX_COMPUTE_UNIT_LIMIT }
fn default_max_sample_age_slots() -> u64 { 432_000 }
fn default_external_timeout() -> u64 { 10 }
fn default_broadcast_window() -> u64 { 60 }
fn default_poll_interval() -> u64 { 5 }
fn default_poll_window() -> u64 { 15 }
fn default_confirm_until_interval_ms() -> u64 { 400 }
fn default_fallback_max_retries() -> usize { 3 }
fn default_preflight_commitment() -> String { "confirmed".to_string() }
fn default_keypair_path() -> String { "~/.config/solana/id.json".to_string() }
fn default_true() -> bool { true }

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: default_rpc_url(),
            commitment: default_commitment(),
            timeout_secs: default_rpc_timeout(),
        }
    }
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            strategy: FeeStrategyKind::default(),
            default_tier: FeeTier::default(),
            default_unit_limit: default_unit_limit(),
            safety_margin_units: default_safety_margin_units(),
            safety_multiplier: default_safety_multiplier(),
            max_unit_limit: default_max_unit_limit(),
            max_sample_age_slots: default_max_sample_age_slots(),
            external: ExternalFeeConfig::default(),
        }
    }
}

impl Default for ExternalFeeConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            timeout_secs: default_external_timeout(),
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            window_secs: default_broadcast_window(),
        }
    }
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            poll_window_secs: default_poll_window(),
            confirm_until_interval_ms: default_confirm_until_interval_ms(),
        }
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            max_retries: default_fallback_max_retries(),
            preflight_commitment: default_preflight_commitment(),
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            keypair_path: default_keypair_path(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_metrics: default_true(),
            json_logs: false,
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            rpc: RpcConfig::default(),
            fees: FeeConfig::default(),
            broadcast: BroadcastConfig::default(),
            confirmation: ConfirmationConfig::default(),
            fallback: FallbackConfig::default(),
            wallet: WalletConfig::default(),
            monitoring: MonitoringConfig::default(),
        }
    }
}

impl DeliveryConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        let config: DeliveryConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;
        Ok(config)
    }

    /// Load configuration with `.env` and environment variable overrides
    pub fn from_file_with_env(path: &str) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (the process environment in production)
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("SOLANA_RPC_URL") {
            self.rpc.url = url;
        }
        if let Some(key) = lookup("HELIUS_API_KEY") {
            // Presence of an API key selects the external estimator
            self.fees.external.api_key = Some(key);
            self.fees.strategy = FeeStrategyKind::External;
            if self.fees.external.url.is_none() {
                self.fees.external.url = Some("https://mainnet.helius-rpc.com/".to_string());
            }
        }
        if let Some(tier) = lookup("TX_DELIVERY_FEE_TIER") {
            self.fees.default_tier = FeeTier::from_str(&tier).map_err(anyhow::Error::msg)?;
        }
        Ok(())
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<(), DeliveryError> {
        let invalid = |msg: &str| Err(DeliveryError::Configuration(msg.to_string()));

        if self.rpc.url.trim().is_empty() {
            return invalid("rpc.url must not be empty");
        }
        self.query_commitment()?;
        self.preflight_commitment()?;
        if self.broadcast.window_secs == 0 {
            return invalid("broadcast.window_secs must be > 0");
        }
        if self.confirmation.poll_interval_secs == 0 {
            return invalid("confirmation.poll_interval_secs must be > 0");
        }
        if self.confirmation.poll_window_secs < self.confirmation.poll_interval_secs {
            return invalid("confirmation.poll_window_secs must be >= poll_interval_secs");
        }
        if !(self.fees.safety_multiplier.is_finite() && self.fees.safety_multiplier >= 1.0) {
            return invalid("fees.safety_multiplier must be >= 1.0");
        }
        if self.fees.max_unit_limit > MAX_COMPUTE_UNIT_LIMIT {
            return invalid("fees.max_unit_limit exceeds the runtime maximum");
        }
        if self.fees.default_unit_limit == 0 || self.fees.default_unit_limit > self.fees.max_unit_limit {
            return invalid("fees.default_unit_limit must be in 1..=max_unit_limit");
        }
        if self.fees.strategy == FeeStrategyKind::External
            && (self.fees.external.url.is_none() || self.fees.external.api_key.is_none())
        {
            return invalid("external fee strategy requires fees.external.url and api_key");
        }
        Ok(())
    }

    pub fn query_commitment(&self) -> Result<CommitmentConfig, DeliveryError> {
        parse_commitment(&self.rpc.commitment)
    }

    pub fn preflight_commitment(&self) -> Result<CommitmentConfig, DeliveryError> {
        parse_commitment(&self.fallback.preflight_commitment)
    }

    pub fn broadcast_window(&self) -> Duration {
        Duration::from_secs(self.broadcast.window_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.confirmation.poll_interval_secs)
    }

    pub fn poll_window(&self) -> Duration {
        Duration::from_secs(self.confirmation.poll_window_secs)
    }

    pub fn confirm_until_interval(&self) -> Duration {
        Duration::from_millis(self.confirmation.confirm_until_interval_ms)
    }
}

fn parse_commitment(raw: &str) -> Result<CommitmentConfig, DeliveryError> {
    CommitmentConfig::from_str(raw)
        .map_err(|_| DeliveryError::Configuration(format!("unknown commitment '{}'", raw)))
}
