//! Work items passed between pipeline stages and the caller-facing handle

use crate::error::{PipelineError, PipelineResult};

use ethers::types::{
    Address, Bytes, Log, NameOrAddress, TransactionReceipt, TransactionRequest, H256, U256, U64,
};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Caller-supplied transaction fields. Nonce is always assigned by the sequencer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionFields {
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
    /// Explicit gas limit; skips estimation when set
    pub gas: Option<U256>,
    /// Explicit gas price; skips the price lookup when set
    pub gas_price: Option<U256>,
}

impl TransactionFields {
    /// Plain value transfer
    pub fn transfer(to: Address, value: impl Into<U256>) -> Self {
        Self {
            to: Some(to),
            value: value.into(),
            ..Default::default()
        }
    }

    pub fn with_data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = data.into();
        self
    }

    pub fn with_gas(mut self, gas: impl Into<U256>) -> Self {
        self.gas = Some(gas.into());
        self
    }

    pub fn with_gas_price(mut self, gas_price: impl Into<U256>) -> Self {
        self.gas_price = Some(gas_price.into());
        self
    }

    /// Unfilled request from `sender` carrying these fields
    pub fn to_request(&self, sender: Address) -> TransactionRequest {
        TransactionRequest {
            from: Some(sender),
            to: self.to.map(NameOrAddress::Address),
            value: Some(self.value),
            data: (!self.data.is_empty()).then(|| self.data.clone()),
            ..Default::default()
        }
    }
}

/// Outcome delivered on a reply channel
pub type Reply = PipelineResult<Confirmation>;

/// A queued submission, consumed exactly once by the sequencer
#[derive(Debug)]
pub struct SubmissionRequest {
    pub id: Uuid,
    pub sender: Address,
    pub fields: TransactionFields,
    pub(crate) reply: oneshot::Sender<Reply>,
    pub(crate) accepted_at: Instant,
}

impl SubmissionRequest {
    pub fn new(sender: Address, fields: TransactionFields) -> (Self, SubmissionHandle) {
        let (reply, rx) = oneshot::channel();
        let id = Uuid::new_v4();
        let request = Self {
            id,
            sender,
            fields,
            reply,
            accepted_at: Instant::now(),
        };
        (request, SubmissionHandle { id, rx })
    }

    /// Answer the caller without dispatching
    pub(crate) fn reject(self, err: PipelineError) {
        let _ = self.reply.send(Err(err));
    }
}

/// A sent transaction awaiting its receipt, consumed exactly once by the watcher
#[derive(Debug)]
pub struct DispatchedTransaction {
    pub id: Uuid,
    pub tx_hash: H256,
    pub sender: Address,
    pub nonce: U256,
    pub(crate) reply: oneshot::Sender<Reply>,
    pub(crate) accepted_at: Instant,
}

impl DispatchedTransaction {
    pub(crate) fn deliver(self, reply: Reply) {
        if self.reply.send(reply).is_err() {
            tracing::debug!("Caller for {:?} stopped waiting", self.tx_hash);
        }
    }
}

/// Terminal result of a submission: the mined transaction and its receipt
#[derive(Debug, Clone)]
pub struct Confirmation {
    pub tx_hash: H256,
    pub nonce: U256,
    pub receipt: TransactionReceipt,
}

impl Confirmation {
    /// True when the transaction executed without reverting
    pub fn succeeded(&self) -> bool {
        self.receipt.status == Some(U64::one())
    }

    pub fn block_number(&self) -> Option<U64> {
        self.receipt.block_number
    }
}

/// Caller side of a submission's private reply channel
#[derive(Debug)]
pub struct SubmissionHandle {
    id: Uuid,
    rx: oneshot::Receiver<Reply>,
}

impl SubmissionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Block the current thread until the result arrives. Must not be called from async code.
    pub fn blocking_wait(self) -> Reply {
        self.rx
            .blocking_recv()
            .unwrap_or(Err(PipelineError::ReplyDropped))
    }
}

impl Future for SubmissionHandle {
    type Output = Reply;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(PipelineError::ReplyDropped)))
    }
}

/// Confirmation plus read-back of the call's return data
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub tx_hash: H256,
    pub receipt: TransactionReceipt,
    /// Output of re-running the call at the receipt's block
    pub return_data: Option<Bytes>,
    /// Receipt logs ordered by log index
    pub logs: Vec<Log>,
    pub error: Option<String>,
}
