//! In-memory ledger used by unit tests

use super::LedgerRpc;
use crate::error::{PipelineError, PipelineResult, TransportError};

use async_trait::async_trait;
use ethers::types::{
    Address, BlockNumber, Bytes, TransactionReceipt, TransactionRequest, H256, U256, U64,
};
use ethers::utils::keccak256;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub(crate) struct FakeState {
    pub counts: HashMap<Address, U256>,
    pub sent: Vec<TransactionRequest>,
    pub receipts: HashMap<H256, TransactionReceipt>,
    pub estimate_calls: usize,
    pub price_calls: usize,
    pub fail_dry_run: bool,
    pub fail_estimate: bool,
    pub fail_send: bool,
    pub withhold_receipts: bool,
    pub block: u64,
}

#[derive(Default)]
pub(crate) struct FakeLedger {
    pub state: Mutex<FakeState>,
}

impl FakeLedger {
    pub fn with_count(sender: Address, count: u64) -> Self {
        let ledger = Self::default();
        ledger.state().counts.insert(sender, U256::from(count));
        ledger
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn sent_nonces(&self, sender: Address) -> Vec<U256> {
        self.state()
            .sent
            .iter()
            .filter(|tx| tx.from == Some(sender))
            .filter_map(|tx| tx.nonce)
            .collect()
    }
}

fn reverted() -> PipelineError {
    TransportError::Rpc {
        code: 3,
        message: "execution reverted".to_string(),
    }
    .into()
}

#[async_trait]
impl LedgerRpc for FakeLedger {
    async fn transaction_count(
        &self,
        address: Address,
        _block: BlockNumber,
    ) -> PipelineResult<U256> {
        Ok(self.state().counts.get(&address).copied().unwrap_or_default())
    }

    async fn estimate_gas(&self, _tx: &TransactionRequest) -> PipelineResult<U256> {
        let mut state = self.state();
        state.estimate_calls += 1;
        if state.fail_estimate {
            return Err(TransportError::Timeout.into());
        }
        Ok(U256::from(21_000))
    }

    async fn gas_price(&self) -> PipelineResult<U256> {
        self.state().price_calls += 1;
        Ok(U256::from(1_000_000_000u64))
    }

    async fn call(&self, _tx: &TransactionRequest, _block: BlockNumber) -> PipelineResult<Bytes> {
        if self.state().fail_dry_run {
            return Err(reverted());
        }
        Ok(Bytes::default())
    }

    async fn send_transaction(&self, tx: &TransactionRequest) -> PipelineResult<H256> {
        let mut state = self.state();
        if state.fail_send {
            return Err(TransportError::Connection("connection reset".to_string()).into());
        }

        let sender = tx.from.unwrap_or_default();
        let nonce = tx.nonce.unwrap_or_default();
        let mut preimage = sender.as_bytes().to_vec();
        preimage.extend_from_slice(&nonce.as_u64().to_be_bytes());
        let tx_hash = H256::from(keccak256(preimage));

        state.block += 1;
        let receipt = TransactionReceipt {
            transaction_hash: tx_hash,
            from: sender,
            block_number: Some(U64::from(state.block)),
            status: Some(U64::one()),
            ..Default::default()
        };
        state.receipts.insert(tx_hash, receipt);
        state.sent.push(tx.clone());
        Ok(tx_hash)
    }

    async fn transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> PipelineResult<Option<TransactionReceipt>> {
        let state = self.state();
        if state.withhold_receipts {
            return Ok(None);
        }
        Ok(state.receipts.get(&tx_hash).cloned())
    }

    async fn block_number(&self) -> PipelineResult<U64> {
        Ok(U64::from(self.state().block))
    }
}
