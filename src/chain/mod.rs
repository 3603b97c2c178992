//! Chain module - the remote node boundary
//!
//! [`LedgerRpc`] lists exactly the node operations the pipeline depends on.
//! [`NodeClient`] implements it over any ethers `JsonRpcClient`, normally a
//! [`RetryingTransport`](crate::transport::RetryingTransport) around ethers' `Http`.

pub mod provider;

#[cfg(test)]
pub(crate) mod fake;

pub use provider::NodeClient;

use crate::error::{PipelineError, PipelineResult};

use async_trait::async_trait;
use ethers::types::{
    Address, BlockNumber, Bytes, TransactionReceipt, TransactionRequest, H256, U256, U64,
};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::debug;

/// Operations the pipeline needs from a ledger node
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    async fn transaction_count(
        &self,
        address: Address,
        block: BlockNumber,
    ) -> PipelineResult<U256>;

    async fn estimate_gas(&self, tx: &TransactionRequest) -> PipelineResult<U256>;

    async fn gas_price(&self) -> PipelineResult<U256>;

    /// Read-only execution of `tx` against the state at `block`
    async fn call(&self, tx: &TransactionRequest, block: BlockNumber) -> PipelineResult<Bytes>;

    async fn send_transaction(&self, tx: &TransactionRequest) -> PipelineResult<H256>;

    /// `None` while the transaction is not yet mined
    async fn transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> PipelineResult<Option<TransactionReceipt>>;

    async fn block_number(&self) -> PipelineResult<U64>;

    /// Poll for the receipt of `tx_hash` until it exists or `limit` elapses
    async fn wait_for_receipt(
        &self,
        tx_hash: H256,
        limit: Duration,
        poll_interval: Duration,
    ) -> PipelineResult<TransactionReceipt> {
        let poll = async {
            loop {
                match self.transaction_receipt(tx_hash).await {
                    Ok(Some(receipt)) => return Ok(receipt),
                    Ok(None) => debug!("Receipt for {:?} not available yet", tx_hash),
                    Err(e) => return Err(e),
                }
                sleep(poll_interval).await;
            }
        };

        match timeout(limit, poll).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::ReceiptTimeout {
                tx_hash,
                timeout: limit,
            }),
        }
    }
}
