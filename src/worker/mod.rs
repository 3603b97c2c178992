//! Worker pool and stage queues shared by the pipeline stages

pub mod pool;
pub mod queue;

pub use pool::{ShutdownSignal, WorkerPool};
pub use queue::{channel, Message, QueueReceiver, QueueSender};
