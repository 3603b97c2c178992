//! Nonce-sequenced transaction submission for EVM JSON-RPC nodes
//!
//! Callers submit transactions through a [`TransactionManager`]. A single
//! sequencer worker assigns gap-free per-sender nonces and sends them, and a
//! single watcher worker waits for each receipt and answers the caller.
//! Every remote call goes through a retrying transport.

pub mod chain;
pub mod config;
pub mod error;
pub mod metrics;
pub mod transport;
pub mod tx;
pub mod worker;

pub use chain::{LedgerRpc, NodeClient};
pub use config::Settings;
pub use error::{PipelineError, PipelineResult, SubmitStage, TransientKind, TransportError};
pub use transport::{http_client, RetryPolicy, RetryingTransport};
pub use tx::{
    Confirmation, ExecutionResult, SubmissionHandle, TransactionFields, TransactionManager,
};
