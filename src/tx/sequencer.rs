//! Nonce sequencer: the single worker that turns queued submissions into sent transactions
//!
//! Requests are handled strictly in arrival order by one worker, which alone owns
//! the [`NonceCache`]. For each request it dry-runs the call, fills in gas and gas
//! price, assigns the sender's next nonce and sends the transaction. Sent
//! transactions are handed to the confirmation watcher; rejected ones are
//! answered immediately with a typed error and leave the nonce cache untouched.

use super::gas::GasEstimator;
use super::nonce::NonceCache;
use super::request::{DispatchedTransaction, SubmissionRequest, TransactionFields};
use crate::chain::LedgerRpc;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult, SubmitStage};
use crate::worker::{self, Message, QueueReceiver, QueueSender, ShutdownSignal, WorkerPool};

use ethers::types::{Address, BlockNumber, H256, U256};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Handle to the running sequencer worker
pub struct NonceSequencer {
    queue: QueueSender<SubmissionRequest>,
    pool: WorkerPool<SubmissionRequest>,
}

impl NonceSequencer {
    /// Spawn the sequencer worker, forwarding sent transactions to `downstream`
    pub fn start(
        rpc: Arc<dyn LedgerRpc>,
        config: &PipelineConfig,
        downstream: QueueSender<DispatchedTransaction>,
    ) -> PipelineResult<Self> {
        let (queue, rx) = worker::channel(config.queue_capacity());
        let pool = WorkerPool::new("nonce-sequencer", 1, Some(queue.clone()));

        let worker = SequencerWorker::new(rpc, config, downstream);
        pool.submit(worker.run(rx, pool.signal()))?;

        Ok(Self { queue, pool })
    }

    /// Queue a request behind everything already accepted
    pub async fn enqueue(&self, request: SubmissionRequest) -> PipelineResult<()> {
        if self.pool.has_shutdown() {
            return Err(PipelineError::ShutDown);
        }

        self.queue
            .push(request)
            .await
            .map_err(|_| PipelineError::ShutDown)?;
        crate::metrics::record_submission_accepted();
        Ok(())
    }

    pub async fn shutdown(&self, wait: bool) {
        self.pool.shutdown(wait).await;
    }

    pub fn has_shutdown(&self) -> bool {
        self.pool.has_shutdown()
    }

    pub fn active(&self) -> usize {
        self.pool.active()
    }
}

struct SequencerWorker {
    rpc: Arc<dyn LedgerRpc>,
    gas: GasEstimator,
    nonces: NonceCache,
    nonce_block: BlockNumber,
    downstream: QueueSender<DispatchedTransaction>,
}

impl SequencerWorker {
    fn new(
        rpc: Arc<dyn LedgerRpc>,
        config: &PipelineConfig,
        downstream: QueueSender<DispatchedTransaction>,
    ) -> Self {
        Self {
            rpc,
            gas: GasEstimator::from_config(config),
            nonces: NonceCache::new(),
            nonce_block: config.nonce_block.into(),
            downstream,
        }
    }

    async fn run(mut self, mut rx: QueueReceiver<SubmissionRequest>, signal: ShutdownSignal) {
        info!("Nonce sequencer started");

        while !signal.has_shutdown() {
            match rx.recv().await {
                Some(Message::Work(request)) => self.handle(request).await,
                Some(Message::Stop) | None => break,
            }
        }

        let abandoned = rx.close_and_drain().await;
        if !abandoned.is_empty() {
            warn!(
                "Nonce sequencer stopping with {} queued submissions",
                abandoned.len()
            );
        }
        for request in abandoned {
            request.reject(PipelineError::ShutDown);
        }

        // Let the watcher drain and exit behind the last dispatched transaction
        if !self.downstream.stop().await {
            debug!("Confirmation queue already closed");
        }

        info!("Nonce sequencer stopped");
    }

    async fn handle(&mut self, request: SubmissionRequest) {
        debug!(
            "Processing submission {} from {:?}",
            request.id, request.sender
        );

        let (tx_hash, nonce) = match self.dispatch(request.sender, &request.fields).await {
            Ok(sent) => sent,
            Err(e) => {
                warn!(
                    "Dropping submission {} from {:?}: {}",
                    request.id, request.sender, e
                );
                if let Some(stage) = e.stage() {
                    crate::metrics::record_submission_rejected(stage);
                }
                request.reject(e);
                return;
            }
        };

        crate::metrics::record_tx_dispatched();

        let SubmissionRequest {
            id,
            sender,
            reply,
            accepted_at,
            ..
        } = request;

        let dispatched = DispatchedTransaction {
            id,
            tx_hash,
            sender,
            nonce,
            reply,
            accepted_at,
        };

        if let Err(dispatched) = self.downstream.push(dispatched).await {
            error!(
                "Confirmation worker is gone, cannot track {:?}",
                dispatched.tx_hash
            );
            let tx_hash = dispatched.tx_hash;
            dispatched.deliver(Err(PipelineError::ConfirmationUnavailable { tx_hash }));
        }
    }

    /// Fill and send one transaction, returning its hash and nonce
    async fn dispatch(
        &mut self,
        sender: Address,
        fields: &TransactionFields,
    ) -> PipelineResult<(H256, U256)> {
        let rpc = self.rpc.as_ref();
        let mut tx = fields.to_request(sender);

        rpc.call(&tx, BlockNumber::Latest)
            .await
            .map_err(|e| PipelineError::rejected(SubmitStage::DryRun, e))?;

        let gas = match fields.gas {
            Some(gas) => gas,
            None => self
                .gas
                .estimate_limit(rpc, &tx)
                .await
                .map_err(|e| PipelineError::rejected(SubmitStage::EstimateGas, e))?,
        };

        let gas_price = match fields.gas_price {
            Some(price) => price,
            None => self
                .gas
                .price(rpc)
                .await
                .map_err(|e| PipelineError::rejected(SubmitStage::GasPrice, e))?,
        };

        let nonce_block = self.nonce_block;
        let nonce = self
            .nonces
            .resolve(sender, || rpc.transaction_count(sender, nonce_block))
            .await
            .map_err(|e| PipelineError::rejected(SubmitStage::NonceLookup, e))?;

        tx.gas = Some(gas);
        tx.gas_price = Some(gas_price);
        tx.nonce = Some(nonce);

        let tx_hash = rpc
            .send_transaction(&tx)
            .await
            .map_err(|e| PipelineError::rejected(SubmitStage::Send, e))?;

        self.nonces.advance(sender);
        info!(
            "Sent {:?} from {:?} (nonce {}, gas {}, gas price {})",
            tx_hash, sender, nonce, gas, gas_price
        );

        Ok((tx_hash, nonce))
    }
}
