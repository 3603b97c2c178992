//! Confirmation watcher: waits for each dispatched transaction to reach a terminal state
//!
//! A reverted transaction is a valid outcome and is delivered like any other
//! receipt. Failing to obtain a receipt at all (timeout, or a transport error
//! that survived retries) is fatal: the error is delivered to the affected
//! caller, recorded, and the worker stops. Anything still queued, or dispatched
//! later, is answered with `ConfirmationUnavailable`.

use super::request::{Confirmation, DispatchedTransaction};
use crate::chain::LedgerRpc;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::worker::{self, Message, QueueReceiver, QueueSender, ShutdownSignal, WorkerPool};

use ethers::types::{TransactionReceipt, H256, U64};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Handle to the running confirmation worker
pub struct ConfirmationWatcher {
    queue: QueueSender<DispatchedTransaction>,
    pool: WorkerPool<DispatchedTransaction>,
    failure: Arc<Mutex<Option<PipelineError>>>,
}

impl ConfirmationWatcher {
    pub fn start(rpc: Arc<dyn LedgerRpc>, config: &PipelineConfig) -> PipelineResult<Self> {
        let (queue, rx) = worker::channel(config.queue_capacity());
        let pool = WorkerPool::new("confirmation-watcher", 1, Some(queue.clone()));
        let failure = Arc::new(Mutex::new(None));

        let worker = WatcherWorker {
            rpc,
            timeout: config.receipt_timeout(),
            poll_interval: config.receipt_poll_interval(),
            confirmation_blocks: config.confirmation_blocks,
            failure: failure.clone(),
        };
        pool.submit(worker.run(rx, pool.signal()))?;

        Ok(Self {
            queue,
            pool,
            failure,
        })
    }

    /// Producer side of the watcher queue, handed to the sequencer
    pub fn queue(&self) -> QueueSender<DispatchedTransaction> {
        self.queue.clone()
    }

    /// Error that stopped the worker, if it stopped abnormally
    pub fn failure(&self) -> Option<PipelineError> {
        self.failure
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Wait for the worker to exit on its own, e.g. after a forwarded stop marker
    pub async fn join(&self) {
        self.pool.join().await;
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

struct WatcherWorker {
    rpc: Arc<dyn LedgerRpc>,
    timeout: Duration,
    poll_interval: Duration,
    confirmation_blocks: u64,
    failure: Arc<Mutex<Option<PipelineError>>>,
}

impl WatcherWorker {
    async fn run(self, mut rx: QueueReceiver<DispatchedTransaction>, signal: ShutdownSignal) {
        info!("Confirmation watcher started");

        while !signal.has_shutdown() {
            match rx.recv().await {
                Some(Message::Work(dispatched)) => {
                    if let Err(e) = self.confirm(dispatched).await {
                        error!("Confirmation watcher stopping: {}", e);
                        break;
                    }
                }
                Some(Message::Stop) | None => break,
            }
        }

        for dispatched in rx.close_and_drain().await {
            let tx_hash = dispatched.tx_hash;
            warn!("Abandoning confirmation of {:?}", tx_hash);
            dispatched.deliver(Err(PipelineError::ConfirmationUnavailable { tx_hash }));
        }

        info!("Confirmation watcher stopped");
    }

    /// Wait for the receipt and deliver it. A receipt-wait failure is recorded and returned.
    async fn confirm(&self, dispatched: DispatchedTransaction) -> PipelineResult<()> {
        let tx_hash = dispatched.tx_hash;
        let started = Instant::now();

        let receipt = match self.await_final(tx_hash).await {
            Ok(receipt) => receipt,
            Err(e) => {
                // Recorded before the caller hears about it
                crate::metrics::record_watcher_failure();
                *self.failure.lock().unwrap_or_else(|e| e.into_inner()) = Some(e.clone());
                dispatched.deliver(Err(e.clone()));
                return Err(e);
            }
        };

        let succeeded = receipt.status == Some(U64::one());
        if succeeded {
            info!(
                "Transaction {:?} (nonce {}) confirmed in block {:?}",
                tx_hash, dispatched.nonce, receipt.block_number
            );
        } else {
            warn!(
                "Transaction {:?} (nonce {}) execution failed in block {:?}",
                tx_hash, dispatched.nonce, receipt.block_number
            );
        }
        crate::metrics::record_receipt(succeeded);
        crate::metrics::record_confirmation_latency(
            dispatched.accepted_at.elapsed().as_secs_f64(),
        );
        debug!("Receipt for {:?} after {:?}", tx_hash, started.elapsed());

        let nonce = dispatched.nonce;
        dispatched.deliver(Ok(Confirmation {
            tx_hash,
            nonce,
            receipt,
        }));
        Ok(())
    }

    /// Receipt plus the configured confirmation depth, within one overall timeout.
    ///
    /// A timeout too large to represent as a deadline means waiting without one.
    async fn await_final(&self, tx_hash: H256) -> PipelineResult<TransactionReceipt> {
        let deadline = Instant::now().checked_add(self.timeout);
        let receipt = self
            .rpc
            .wait_for_receipt(tx_hash, self.timeout, self.poll_interval)
            .await?;

        if self.confirmation_blocks == 0 {
            return Ok(receipt);
        }

        let mined_at = receipt.block_number.unwrap_or_default();
        let target = mined_at.saturating_add(U64::from(self.confirmation_blocks));
        loop {
            let head = self.rpc.block_number().await?;
            if head >= target {
                debug!(
                    "{:?} has {} confirmations",
                    tx_hash,
                    head.saturating_sub(mined_at)
                );
                return Ok(receipt);
            }
            if deadline.map_or(false, |deadline| Instant::now() >= deadline) {
                return Err(PipelineError::ReceiptTimeout {
                    tx_hash,
                    timeout: self.timeout,
                });
            }
            sleep(self.poll_interval).await;
        }
    }
}
