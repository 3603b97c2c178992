//! Bounded worker pool with cooperative shutdown
//!
//! Workers are tokio tasks. At most `max_workers` submitted tasks run at once;
//! the rest wait for a permit. A worker loop is expected to poll
//! [`ShutdownSignal::has_shutdown`] instead of looping unconditionally, so it can
//! always terminate once shutdown is requested.

use super::queue::QueueSender;
use crate::error::{PipelineError, PipelineResult};

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Read-only view of a pool's shutdown flag, handed to worker loops
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn has_shutdown(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Runs up to `max_workers` tasks and owns the stop marker for one queue
pub struct WorkerPool<T> {
    name: String,
    permits: Arc<Semaphore>,
    shutdown: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
    queue: Option<QueueSender<T>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Create a pool. If `queue` is given, shutdown enqueues one stop marker on it.
    pub fn new(name: impl Into<String>, max_workers: usize, queue: Option<QueueSender<T>>) -> Self {
        Self {
            name: name.into(),
            permits: Arc::new(Semaphore::new(max_workers.max(1))),
            shutdown: Arc::new(AtomicBool::new(false)),
            active: Arc::new(AtomicUsize::new(0)),
            queue,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Schedule a task without blocking the caller.
    ///
    /// Errors raised inside the task are the task's own concern.
    pub fn submit<F>(&self, task: F) -> PipelineResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.has_shutdown() {
            return Err(PipelineError::ShutDown);
        }

        let permits = self.permits.clone();
        let active = self.active.clone();
        let name = self.name.clone();

        let handle = tokio::spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            let _running = RunningGuard::enter(active);
            debug!("Worker started in pool {}", name);
            task.await;
            debug!("Worker finished in pool {}", name);
        });

        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
        Ok(())
    }

    /// Request shutdown.
    ///
    /// Marks the pool, enqueues one stop marker if a queue was supplied, and when
    /// `wait` is true blocks until every running and queued task has finished.
    pub async fn shutdown(&self, wait: bool) {
        self.shutdown.store(true, Ordering::Release);

        if let Some(queue) = &self.queue {
            if !queue.stop().await {
                debug!("Queue for pool {} already closed", self.name);
            }
        }

        if wait {
            self.join().await;
        }
    }

    /// Wait for every submitted task to finish without requesting shutdown
    pub async fn join(&self) {
        let handles = {
            let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *handles)
        };

        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Worker in pool {} ended abnormally: {}", self.name, e);
            }
        }
    }

    pub fn has_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            flag: self.shutdown.clone(),
        }
    }

    /// Number of tasks currently executing
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

struct RunningGuard {
    active: Arc<AtomicUsize>,
}

impl RunningGuard {
    fn enter(active: Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::AcqRel);
        Self { active }
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}
