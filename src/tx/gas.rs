//! Gas limit and gas price lookup with optional safety buffers

use crate::chain::LedgerRpc;
use crate::config::PipelineConfig;
use crate::error::PipelineResult;

use ethers::types::{TransactionRequest, U256};
use tracing::debug;

/// Gas estimator for outgoing transactions
#[derive(Debug, Clone, Default)]
pub struct GasEstimator {
    /// Buffer percentage for gas limit (e.g., 20 = 20% buffer)
    gas_limit_buffer_percent: u64,
    /// Buffer percentage for gas price
    gas_price_buffer_percent: u64,
}

impl GasEstimator {
    pub fn new(gas_limit_buffer_percent: u64, gas_price_buffer_percent: u64) -> Self {
        Self {
            gas_limit_buffer_percent,
            gas_price_buffer_percent,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.gas_limit_buffer_percent,
            config.gas_price_buffer_percent,
        )
    }

    /// Node gas estimate for `tx` plus the configured buffer
    pub async fn estimate_limit(
        &self,
        rpc: &dyn LedgerRpc,
        tx: &TransactionRequest,
    ) -> PipelineResult<U256> {
        let estimate = rpc.estimate_gas(tx).await?;
        let limit = with_buffer(estimate, self.gas_limit_buffer_percent);
        debug!("Gas limit: estimate {} -> {}", estimate, limit);
        Ok(limit)
    }

    /// Current node gas price plus the configured buffer
    pub async fn price(&self, rpc: &dyn LedgerRpc) -> PipelineResult<U256> {
        let price = rpc.gas_price().await?;
        Ok(with_buffer(price, self.gas_price_buffer_percent))
    }
}

fn with_buffer(value: U256, percent: u64) -> U256 {
    value + value * percent / 100
}
