//! Submission façade over the two pipeline stages

use super::request::{ExecutionResult, SubmissionHandle, SubmissionRequest, TransactionFields};
use super::sequencer::NonceSequencer;
use super::watcher::ConfirmationWatcher;
use crate::chain::{LedgerRpc, NodeClient};
use crate::config::{PipelineConfig, Settings};
use crate::error::{PipelineError, PipelineResult};
use crate::transport::{http_client, RetryPolicy, RetryingTransport};

use ethers::types::{Address, BlockNumber, U64};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Entry point for callers: owns the sequencer and watcher workers
pub struct TransactionManager {
    rpc: Arc<dyn LedgerRpc>,
    sequencer: NonceSequencer,
    watcher: ConfirmationWatcher,
}

impl TransactionManager {
    /// Start both workers against an existing node client
    pub fn new(rpc: Arc<dyn LedgerRpc>, config: &PipelineConfig) -> PipelineResult<Self> {
        let watcher = ConfirmationWatcher::start(rpc.clone(), config)?;
        let sequencer = NonceSequencer::start(rpc.clone(), config, watcher.queue())?;

        info!("Transaction pipeline started");
        Ok(Self {
            rpc,
            sequencer,
            watcher,
        })
    }

    /// Build the HTTP node client with the configured retry policy and start the pipeline
    pub fn connect(settings: &Settings) -> PipelineResult<Self> {
        let http = http_client(&settings.node)?;
        let policy = RetryPolicy::from_config(&settings.retry);
        info!(
            "Connecting to {} ({:?} after {} attempts)",
            settings.node.rpc_url,
            policy.on_exhausted(),
            policy.max_attempts()
        );

        let client = NodeClient::new(RetryingTransport::new(http, policy));
        Self::new(Arc::new(client), &settings.pipeline)
    }

    /// Queue a transaction from `sender`. Await the returned handle for its receipt.
    pub async fn submit(
        &self,
        sender: Address,
        fields: TransactionFields,
    ) -> PipelineResult<SubmissionHandle> {
        let (request, handle) = SubmissionRequest::new(sender, fields);
        debug!("Submission {} from {:?}", request.id, sender);
        self.sequencer.enqueue(request).await?;
        Ok(handle)
    }

    /// Submit, wait for the receipt and read back the call's return data
    pub async fn execute(
        &self,
        sender: Address,
        fields: TransactionFields,
    ) -> PipelineResult<ExecutionResult> {
        let call = fields.to_request(sender);
        let confirmation = self.submit(sender, fields).await?.await?;

        let block = confirmation
            .block_number()
            .map(BlockNumber::Number)
            .unwrap_or(BlockNumber::Latest);
        let return_data = match self.rpc.call(&call, block).await {
            Ok(data) => Some(data),
            Err(e) => {
                debug!(
                    "No return data for {:?} at {:?}: {}",
                    confirmation.tx_hash, block, e
                );
                None
            }
        };

        let mut logs = confirmation.receipt.logs.clone();
        logs.sort_by_key(|log| log.log_index.unwrap_or_default());

        let error = (confirmation.receipt.status == Some(U64::zero())).then(|| {
            format!(
                "transaction {:?} reverted in block {}",
                confirmation.tx_hash,
                confirmation.block_number().unwrap_or_default()
            )
        });

        Ok(ExecutionResult {
            tx_hash: confirmation.tx_hash,
            receipt: confirmation.receipt,
            return_data,
            logs,
            error,
        })
    }

    /// Stop accepting submissions. With `wait`, every accepted submission has
    /// been answered when this returns.
    pub async fn shutdown(&self, wait: bool) {
        info!("Shutting down transaction pipeline");
        self.sequencer.shutdown(wait).await;
        if wait {
            // The sequencer forwards its stop marker, so the watcher exits after the backlog
            self.watcher.join().await;
        }
        self.watcher.shutdown(wait).await;

        if let Some(e) = self.watcher.failure() {
            warn!("Confirmation watcher had stopped early: {}", e);
        }
    }

    pub fn has_shutdown(&self) -> bool {
        self.sequencer.has_shutdown()
    }

    /// Error that terminated the confirmation watcher, if any
    pub fn watcher_failure(&self) -> Option<PipelineError> {
        self.watcher.failure()
    }

    /// Workers currently running across both stages
    pub fn active_workers(&self) -> usize {
        self.sequencer.active() + self.watcher.active()
    }
}
