//! Error types for the transaction pipeline

use ethers::providers::{JsonRpcError, ProviderError, RpcError};
use ethers::types::H256;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Transport failure categories that are presumed recoverable by retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransientKind {
    Connection,
    Http,
    Timeout,
    TooManyRedirects,
}

impl TransientKind {
    pub const ALL: [TransientKind; 4] = [
        TransientKind::Connection,
        TransientKind::Http,
        TransientKind::Timeout,
        TransientKind::TooManyRedirects,
    ];
}

/// Errors raised by a single remote call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Non-success status or a body that is not a JSON-RPC response
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Too many redirects: {0}")]
    TooManyRedirects(String),

    /// Application-level error returned by the node. Never retried.
    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl TransportError {
    /// Category of this error if it is a transport-level failure
    pub fn transient_kind(&self) -> Option<TransientKind> {
        match self {
            TransportError::Connection(_) => Some(TransientKind::Connection),
            TransportError::Http(_) => Some(TransientKind::Http),
            TransportError::Timeout => Some(TransientKind::Timeout),
            TransportError::TooManyRedirects(_) => Some(TransientKind::TooManyRedirects),
            TransportError::Rpc { .. } | TransportError::InvalidResponse(_) => None,
        }
    }
}

impl RpcError for TransportError {
    fn as_error_response(&self) -> Option<&JsonRpcError> {
        None
    }

    fn as_serde_error(&self) -> Option<&serde_json::Error> {
        None
    }
}

impl From<TransportError> for ProviderError {
    fn from(e: TransportError) -> Self {
        ProviderError::JsonRpcClientError(Box::new(e))
    }
}

/// Step of the submission flow that rejected a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitStage {
    DryRun,
    EstimateGas,
    GasPrice,
    NonceLookup,
    Send,
}

impl SubmitStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmitStage::DryRun => "dry_run",
            SubmitStage::EstimateGas => "estimate_gas",
            SubmitStage::GasPrice => "gas_price",
            SubmitStage::NonceLookup => "nonce_lookup",
            SubmitStage::Send => "send",
        }
    }
}

impl fmt::Display for SubmitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for the pipeline
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Node returned no result for {method}")]
    EmptyResponse { method: String },

    #[error("Failed to decode {method} response: {message}")]
    Decode { method: String, message: String },

    /// Submission-time failure. The nonce cache is left untouched.
    #[error("Submission rejected at {stage}: {source}")]
    Rejected {
        stage: SubmitStage,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("Timed out after {timeout:?} waiting for receipt of {tx_hash:?}")]
    ReceiptTimeout { tx_hash: H256, timeout: Duration },

    /// The transaction was sent but no confirmation worker is left to observe it
    #[error("Transaction {tx_hash:?} was sent but cannot be confirmed")]
    ConfirmationUnavailable { tx_hash: H256 },

    #[error("Pipeline has shut down")]
    ShutDown,

    #[error("Reply channel closed before a result was delivered")]
    ReplyDropped,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    pub(crate) fn rejected(stage: SubmitStage, source: PipelineError) -> Self {
        PipelineError::Rejected {
            stage,
            source: Box::new(source),
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Transport(e) => e.transient_kind().is_some(),
            PipelineError::ReceiptTimeout { .. } => true,
            PipelineError::Rejected { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Stage that rejected the submission, if any
    pub fn stage(&self) -> Option<SubmitStage> {
        match self {
            PipelineError::Rejected { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert_eq!(
            TransportError::Timeout.transient_kind(),
            Some(TransientKind::Timeout)
        );
        assert_eq!(
            TransportError::Http("502 Bad Gateway".to_string()).transient_kind(),
            Some(TransientKind::Http)
        );
        assert_eq!(
            TransportError::Rpc {
                code: 3,
                message: "execution reverted".to_string()
            }
            .transient_kind(),
            None
        );
    }

    #[test]
    fn test_rejected_reports_stage() {
        let err = PipelineError::rejected(
            SubmitStage::DryRun,
            TransportError::Connection("reset".to_string()).into(),
        );
        assert_eq!(err.stage(), Some(SubmitStage::DryRun));
        assert!(err.is_retryable());
        assert!(err.to_string().contains("dry_run"));
    }
}
