//! Transaction pipeline: nonce sequencing, gas filling and confirmation tracking

mod gas;
mod manager;
mod nonce;
mod request;
mod sequencer;
mod watcher;

pub use gas::GasEstimator;
pub use manager::TransactionManager;
pub use nonce::NonceCache;
pub use request::{
    Confirmation, DispatchedTransaction, ExecutionResult, Reply, SubmissionHandle,
    SubmissionRequest, TransactionFields,
};
pub use sequencer::NonceSequencer;
pub use watcher::ConfirmationWatcher;
