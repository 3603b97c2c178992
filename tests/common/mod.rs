//! In-memory JSON-RPC node shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use ethers::providers::JsonRpcClient;
use ethers::types::{
    Address, Bytes, Log, TransactionReceipt, TransactionRequest, H256, U256, U64,
};
use ethers::utils::keccak256;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tx_pipeline::config::PipelineConfig;
use tx_pipeline::{NodeClient, RetryPolicy, RetryingTransport, TransactionManager, TransportError};

/// Calldata that makes the fake node mine a reverted transaction
pub const REVERT_DATA: [u8; 2] = [0xde, 0xad];

pub const RETURN_DATA: [u8; 1] = [0x2a];

#[derive(Debug, Default)]
pub struct NodeState {
    /// Next nonce the node will accept per sender
    pub counts: HashMap<Address, U256>,
    pub sent: Vec<TransactionRequest>,
    pub receipts: HashMap<H256, TransactionReceipt>,
    pub block: u64,
    /// Method name to number of upcoming connection failures
    pub transient_failures: HashMap<String, usize>,
    pub calls: HashMap<String, usize>,
    pub fail_calls: bool,
    pub withhold_receipts: bool,
    /// Sends that are applied but answered with a timeout
    pub lost_send_replies: usize,
}

#[derive(Debug, Default)]
pub struct FakeNode {
    state: Mutex<NodeState>,
}

impl FakeNode {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn state(&self) -> MutexGuard<'_, NodeState> {
        self.state.lock().unwrap()
    }

    pub fn set_count(&self, sender: Address, count: u64) {
        self.state().counts.insert(sender, U256::from(count));
    }

    pub fn fail_next(&self, method: &str, times: usize) {
        self.state()
            .transient_failures
            .insert(method.to_string(), times);
    }

    pub fn calls(&self, method: &str) -> usize {
        self.state().calls.get(method).copied().unwrap_or_default()
    }

    pub fn sent_nonces(&self, sender: Address) -> Vec<u64> {
        self.state()
            .sent
            .iter()
            .filter(|tx| tx.from == Some(sender))
            .filter_map(|tx| tx.nonce.map(|n| n.as_u64()))
            .collect()
    }

    fn handle(&self, method: &str, params: &Value) -> Result<Value, TransportError> {
        let mut state = self.state();
        *state.calls.entry(method.to_string()).or_default() += 1;

        if let Some(remaining) = state.transient_failures.get_mut(method) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(TransportError::Connection("connection refused".to_string()));
            }
        }

        match method {
            "eth_getTransactionCount" => {
                let address: Address = decode(&params[0])?;
                Ok(json!(state.counts.get(&address).copied().unwrap_or_default()))
            }
            "eth_estimateGas" => Ok(json!(U256::from(21_000))),
            "eth_gasPrice" => Ok(json!(U256::from(1_000_000_000u64))),
            "eth_call" => {
                if state.fail_calls {
                    return Err(rpc_error(3, "execution reverted"));
                }
                Ok(json!(Bytes::from(RETURN_DATA.to_vec())))
            }
            "eth_sendTransaction" => {
                let tx: TransactionRequest = decode(&params[0])?;
                let hash = send(&mut state, tx)?;
                if state.lost_send_replies > 0 {
                    state.lost_send_replies -= 1;
                    return Err(TransportError::Timeout);
                }
                Ok(json!(hash))
            }
            "eth_getTransactionReceipt" => {
                if state.withhold_receipts {
                    return Ok(Value::Null);
                }
                let hash: H256 = decode(&params[0])?;
                Ok(state
                    .receipts
                    .get(&hash)
                    .map(|receipt| json!(receipt))
                    .unwrap_or(Value::Null))
            }
            "eth_blockNumber" => Ok(json!(U64::from(state.block))),
            _ => Err(rpc_error(-32601, "method not found")),
        }
    }
}

#[async_trait]
impl JsonRpcClient for FakeNode {
    type Error = TransportError;

    async fn request<T, R>(&self, method: &str, params: T) -> Result<R, TransportError>
    where
        T: Debug + Serialize + Send + Sync,
        R: DeserializeOwned + Send,
    {
        let params = serde_json::to_value(params)
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;
        let result = self.handle(method, &params)?;
        decode(&result)
    }
}

fn send(state: &mut NodeState, tx: TransactionRequest) -> Result<H256, TransportError> {
    let sender = tx
        .from
        .ok_or_else(|| rpc_error(-32000, "missing sender"))?;
    let nonce = tx.nonce.ok_or_else(|| rpc_error(-32000, "missing nonce"))?;
    if tx.gas.is_none() || tx.gas_price.is_none() {
        return Err(rpc_error(-32000, "gas not filled"));
    }

    let expected = state.counts.get(&sender).copied().unwrap_or_default();
    if nonce != expected {
        return Err(rpc_error(
            -32000,
            &format!("invalid nonce: expected {}, got {}", expected, nonce),
        ));
    }
    state.counts.insert(sender, expected + 1);

    let mut preimage = sender.as_bytes().to_vec();
    preimage.extend_from_slice(&nonce.as_u64().to_be_bytes());
    let tx_hash = H256::from(keccak256(preimage));

    let reverted = tx.data.as_ref().map(|d| d.to_vec()) == Some(REVERT_DATA.to_vec());
    state.block += 1;
    let block_number = Some(U64::from(state.block));
    let logs = [3u64, 1]
        .into_iter()
        .map(|index| Log {
            transaction_hash: Some(tx_hash),
            block_number,
            log_index: Some(U256::from(index)),
            ..Default::default()
        })
        .collect();
    let receipt = TransactionReceipt {
        transaction_hash: tx_hash,
        from: sender,
        block_number,
        status: Some(if reverted { U64::zero() } else { U64::one() }),
        logs,
        ..Default::default()
    };
    state.receipts.insert(tx_hash, receipt);
    state.sent.push(tx);

    Ok(tx_hash)
}

fn decode<T: DeserializeOwned>(value: &Value) -> Result<T, TransportError> {
    serde_json::from_value(value.clone())
        .map_err(|e| TransportError::InvalidResponse(e.to_string()))
}

fn rpc_error(code: i64, message: &str) -> TransportError {
    TransportError::Rpc {
        code,
        message: message.to_string(),
    }
}

pub fn fast_pipeline() -> PipelineConfig {
    PipelineConfig {
        receipt_timeout_secs: 1,
        receipt_poll_interval_ms: 5,
        ..Default::default()
    }
}

/// Full pipeline over the fake node with a propagating retry policy
pub fn manager_for(node: &Arc<FakeNode>, config: &PipelineConfig) -> TransactionManager {
    let policy = RetryPolicy::propagate(5).with_delay(Duration::from_millis(1));
    manager_with_policy(node, config, policy)
}

pub fn manager_with_policy(
    node: &Arc<FakeNode>,
    config: &PipelineConfig,
    policy: RetryPolicy,
) -> TransactionManager {
    let client = NodeClient::new(RetryingTransport::new(node.clone(), policy));
    TransactionManager::new(Arc::new(client), config).unwrap()
}
