//! Configuration management for the transaction pipeline
//!
//! Loads configuration from TOML files with environment variable substitution.

use crate::error::TransientKind;

use anyhow::{Context, Result};
use ethers::types::{Address, BlockNumber, U256};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub node: NodeConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub transfers: Vec<TransferConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    pub rpc_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

/// What a retried call does once every attempt has failed
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OnExhausted {
    /// Re-raise the last error
    #[default]
    Propagate,
    /// Return an absent (JSON `null`) result
    Swallow,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub policy: OnExhausted,
    /// Total attempts per call, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default = "default_retry_on")]
    pub retry_on: Vec<TransientKind>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            policy: OnExhausted::Propagate,
            max_attempts: default_max_attempts(),
            delay_ms: 0,
            retry_on: default_retry_on(),
        }
    }
}

/// Block used when seeding a sender's nonce from the node
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NonceBlock {
    #[default]
    Latest,
    Pending,
}

impl From<NonceBlock> for BlockNumber {
    fn from(block: NonceBlock) -> Self {
        match block {
            NonceBlock::Latest => BlockNumber::Latest,
            NonceBlock::Pending => BlockNumber::Pending,
        }
    }
}

/// Longest accepted receipt wait: 30 days
pub const MAX_RECEIPT_TIMEOUT_SECS: u64 = 30 * 24 * 60 * 60;

/// Deepest accepted confirmation wait
pub const MAX_CONFIRMATION_BLOCKS: u64 = 100_000;

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Capacity of each stage queue; 0 means unbounded
    #[serde(default)]
    pub queue_capacity: usize,
    #[serde(default = "default_receipt_timeout_secs")]
    pub receipt_timeout_secs: u64,
    #[serde(default = "default_receipt_poll_interval_ms")]
    pub receipt_poll_interval_ms: u64,
    #[serde(default)]
    pub confirmation_blocks: u64,
    #[serde(default)]
    pub nonce_block: NonceBlock,
    #[serde(default)]
    pub gas_limit_buffer_percent: u64,
    #[serde(default)]
    pub gas_price_buffer_percent: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 0,
            receipt_timeout_secs: default_receipt_timeout_secs(),
            receipt_poll_interval_ms: default_receipt_poll_interval_ms(),
            confirmation_blocks: 0,
            nonce_block: NonceBlock::Latest,
            gas_limit_buffer_percent: 0,
            gas_price_buffer_percent: 0,
        }
    }
}

impl PipelineConfig {
    pub fn queue_capacity(&self) -> Option<usize> {
        (self.queue_capacity > 0).then_some(self.queue_capacity)
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// A value transfer submitted by the binary at startup
#[derive(Debug, Clone, Deserialize)]
pub struct TransferConfig {
    pub from: Address,
    pub to: Address,
    pub value: U256,
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_redirects() -> usize {
    10
}

fn default_max_attempts() -> u32 {
    5
}

fn default_retry_on() -> Vec<TransientKind> {
    TransientKind::ALL.to_vec()
}

fn default_receipt_timeout_secs() -> u64 {
    2000
}

fn default_receipt_poll_interval_ms() -> u64 {
    100
}

fn default_metrics_port() -> u16 {
    9100
}

impl Settings {
    /// Load settings from the file named by `TX_PIPELINE_CONFIG`
    pub fn load() -> Result<Self> {
        let config_path = env::var("TX_PIPELINE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::from_toml_str(&config_str)
    }

    /// Parse settings from TOML text, substituting `${VAR}` placeholders first
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config_str = substitute_env_vars(input);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.node.rpc_url.trim().is_empty() {
            anyhow::bail!("node.rpc_url must not be empty");
        }
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        if self.pipeline.receipt_timeout_secs == 0 {
            anyhow::bail!("pipeline.receipt_timeout_secs must be positive");
        }
        if self.pipeline.receipt_timeout_secs > MAX_RECEIPT_TIMEOUT_SECS {
            anyhow::bail!(
                "pipeline.receipt_timeout_secs must be at most {}",
                MAX_RECEIPT_TIMEOUT_SECS
            );
        }
        if self.pipeline.confirmation_blocks > MAX_CONFIRMATION_BLOCKS {
            anyhow::bail!(
                "pipeline.confirmation_blocks must be at most {}",
                MAX_CONFIRMATION_BLOCKS
            );
        }
        if self.retry.retry_on.is_empty() {
            tracing::warn!("retry.retry_on is empty - transport errors will never be retried");
        }

        Ok(())
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("static regex is valid");

    re.replace_all(input, |caps: &regex::Captures<'_>| {
        env::var(&caps[1]).unwrap_or_default()
    })
    .into_owned()
}
