//! Typed node client on top of an ethers [`JsonRpcClient`]
//!
//! ethers' `Provider` is not used for these calls: it folds client errors into
//! `ProviderError`, where the transient category the sequencer reports is no
//! longer visible, and its `send_transaction` fills fields the sequencer owns.

use super::LedgerRpc;
use crate::error::{PipelineError, PipelineResult, TransportError};
use crate::transport::JsonRpcClient;

use async_trait::async_trait;
use ethers::types::{
    Address, BlockNumber, Bytes, TransactionReceipt, TransactionRequest, H256, U256, U64,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;

/// Ledger node reached through a JSON-RPC client
pub struct NodeClient<T> {
    transport: T,
}

impl<T> NodeClient<T>
where
    T: JsonRpcClient,
    T::Error: Into<TransportError>,
{
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Issue a request whose result must be present
    async fn required<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> PipelineResult<R> {
        self.optional(method, params)
            .await?
            .ok_or_else(|| PipelineError::EmptyResponse {
                method: method.to_string(),
            })
    }

    /// Issue a request whose result may legitimately be `null`
    async fn optional<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> PipelineResult<Option<R>> {
        let value: Value = self
            .transport
            .request(method, params)
            .await
            .map_err(Into::<TransportError>::into)?;
        if value.is_null() {
            return Ok(None);
        }

        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| PipelineError::Decode {
                method: method.to_string(),
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl<T> LedgerRpc for NodeClient<T>
where
    T: JsonRpcClient,
    T::Error: Into<TransportError>,
{
    async fn transaction_count(
        &self,
        address: Address,
        block: BlockNumber,
    ) -> PipelineResult<U256> {
        self.required("eth_getTransactionCount", json!([address, block]))
            .await
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> PipelineResult<U256> {
        self.required("eth_estimateGas", json!([tx])).await
    }

    async fn gas_price(&self) -> PipelineResult<U256> {
        self.required("eth_gasPrice", json!([])).await
    }

    async fn call(&self, tx: &TransactionRequest, block: BlockNumber) -> PipelineResult<Bytes> {
        self.required("eth_call", json!([tx, block])).await
    }

    async fn send_transaction(&self, tx: &TransactionRequest) -> PipelineResult<H256> {
        let hash: H256 = self.required("eth_sendTransaction", json!([tx])).await?;
        debug!("Node accepted transaction {:?}", hash);
        Ok(hash)
    }

    async fn transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> PipelineResult<Option<TransactionReceipt>> {
        self.optional("eth_getTransactionReceipt", json!([tx_hash]))
            .await
    }

    async fn block_number(&self) -> PipelineResult<U64> {
        self.required("eth_blockNumber", json!([])).await
    }
}
