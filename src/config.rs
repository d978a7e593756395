//! Configuration module for the transaction client
//!
//! This module handles configuration loading from TOML files and environment
//! variables, and provides the structured configuration types every client
//! component is built from. A `ClientConfig` is created once per client and
//! passed around explicitly.

use crate::tx_builder::envelope::SignMode;
use crate::tx_builder::errors::{PipelineResult, TxError};
use crate::tx_builder::fee::{Coins, DecCoins};
use crate::types::BroadcastMode;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Chain id bound into every signature
    pub chain_id: String,

    /// Default gas limit
    #[serde(default = "default_gas")]
    pub gas: u64,

    /// Multiplier applied to simulated gas
    #[serde(default = "default_gas_adjustment")]
    pub gas_adjustment: f64,

    /// Default explicit fee, e.g. `"5000uiris"`
    #[serde(default)]
    pub fee: Option<String>,

    /// Default gas prices, e.g. `"0.025uiris"`
    #[serde(default)]
    pub gas_prices: Option<String>,

    #[serde(default)]
    pub mode: BroadcastMode,

    #[serde(default = "default_sign_mode")]
    pub sign_mode: SignMode,

    /// Overall deadline for one send in milliseconds; none by default
    #[serde(default)]
    pub send_timeout_ms: Option<u64>,

    #[serde(default)]
    pub sequence: SequenceConfig,

    #[serde(default)]
    pub batch: BatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceConfig {
    /// Lifetime of a cached account state in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Number of lock shards senders are spread across
    #[serde(default = "default_lock_shards")]
    pub lock_shards: usize,

    /// Submissions per send before a sequence conflict is surfaced
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Messages per transaction a batch starts with
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Largest encoded transaction submitted, in bytes
    #[serde(default = "default_max_tx_bytes")]
    pub max_tx_bytes: usize,
}

// Default value functions
fn default_gas() -> u64 { 200_000 }
fn default_gas_adjustment() -> f64 { 1.0 }
fn default_sign_mode() -> SignMode { SignMode::Direct }
fn default_cache_ttl_secs() -> u64 { 60 }
fn default_lock_shards() -> usize { 16 }
fn default_max_attempts() -> u32 { 3 }
fn default_max_batch_size() -> usize { 100 }
fn default_max_tx_bytes() -> usize { 1_048_576 }

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            lock_shards: default_lock_shards(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            max_tx_bytes: default_max_tx_bytes(),
        }
    }
}

impl ClientConfig {
    /// Configuration for `chain_id` with every other field at its default
    pub fn new(chain_id: impl Into<String>) -> Self {
        Self {
            chain_id: chain_id.into(),
            gas: default_gas(),
            gas_adjustment: default_gas_adjustment(),
            fee: None,
            gas_prices: None,
            mode: BroadcastMode::default(),
            sign_mode: default_sign_mode(),
            send_timeout_ms: None,
            sequence: SequenceConfig::default(),
            batch: BatchConfig::default(),
        }
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: ClientConfig = toml::from_str(content).context("invalid client configuration")?;
        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Load configuration with environment variable overrides
    ///
    /// A `.env` file is honoured when present. Recognised variables are
    /// `TX_CHAIN_ID`, `TX_GAS`, `TX_FEE`, `TX_GAS_PRICES` and
    /// `TX_BROADCAST_MODE`.
    pub fn from_file_with_env(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::from_file(path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(chain_id) = lookup("TX_CHAIN_ID") {
            self.chain_id = chain_id;
        }
        if let Some(gas) = lookup("TX_GAS") {
            self.gas = gas
                .trim()
                .parse()
                .with_context(|| format!("TX_GAS is not a number: {:?}", gas))?;
        }
        if let Some(fee) = lookup("TX_FEE") {
            self.fee = Some(fee);
        }
        if let Some(gas_prices) = lookup("TX_GAS_PRICES") {
            self.gas_prices = Some(gas_prices);
        }
        if let Some(mode) = lookup("TX_BROADCAST_MODE") {
            self.mode = mode.parse()?;
        }
        Ok(())
    }

    /// Check the configuration for values no client can work with
    pub fn validate(&self) -> PipelineResult<()> {
        if self.chain_id.trim().is_empty() {
            return Err(TxError::config("chain_id must not be empty"));
        }
        if self.sequence.lock_shards == 0 {
            return Err(TxError::config("sequence.lock_shards must be at least 1"));
        }
        if self.sequence.max_attempts == 0 {
            return Err(TxError::config("sequence.max_attempts must be at least 1"));
        }
        if self.batch.max_batch_size == 0 {
            return Err(TxError::config("batch.max_batch_size must be at least 1"));
        }
        if !(self.gas_adjustment.is_finite() && self.gas_adjustment > 0.0) {
            return Err(TxError::config(format!(
                "gas_adjustment must be positive, got {}",
                self.gas_adjustment
            )));
        }
        let (fees, gas_prices) = self.fee_spec()?;
        if !fees.is_zero() && !gas_prices.is_zero() {
            return Err(TxError::ConflictingFeeSpec {
                fees: fees.to_string(),
                gas_prices: gas_prices.to_string(),
            });
        }
        Ok(())
    }

    /// Parsed default fee and gas prices
    pub fn fee_spec(&self) -> PipelineResult<(Coins, DecCoins)> {
        let fees = match &self.fee {
            Some(fee) => Coins::parse(fee)?,
            None => Coins::default(),
        };
        let gas_prices = match &self.gas_prices {
            Some(prices) => DecCoins::parse(prices)?,
            None => DecCoins::default(),
        };
        Ok((fees, gas_prices))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.sequence.cache_ttl_secs)
    }

    pub fn send_timeout(&self) -> Option<Duration> {
        self.send_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("")
    }
}
