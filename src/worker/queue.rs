//! Stage queues carrying work items and a stop marker

use tokio::sync::mpsc;

/// Item travelling through a stage queue
#[derive(Debug)]
pub enum Message<T> {
    Work(T),
    /// No more work. A consumer forwards this to the next stage before exiting.
    Stop,
}

/// Create a queue. `None` capacity means unbounded.
pub fn channel<T>(capacity: Option<usize>) -> (QueueSender<T>, QueueReceiver<T>) {
    match capacity {
        Some(capacity) => {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            (QueueSender::Bounded(tx), QueueReceiver::Bounded(rx))
        }
        None => {
            let (tx, rx) = mpsc::unbounded_channel();
            (QueueSender::Unbounded(tx), QueueReceiver::Unbounded(rx))
        }
    }
}

/// Producer side. Cheap to clone; safe for many concurrent producers.
#[derive(Debug)]
pub enum QueueSender<T> {
    Bounded(mpsc::Sender<Message<T>>),
    Unbounded(mpsc::UnboundedSender<Message<T>>),
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        match self {
            QueueSender::Bounded(tx) => QueueSender::Bounded(tx.clone()),
            QueueSender::Unbounded(tx) => QueueSender::Unbounded(tx.clone()),
        }
    }
}

impl<T> QueueSender<T> {
    /// Enqueue a work item, handing it back if the consumer is gone
    pub async fn push(&self, item: T) -> Result<(), T> {
        let result = match self {
            QueueSender::Bounded(tx) => tx.send(Message::Work(item)).await.map_err(|e| e.0),
            QueueSender::Unbounded(tx) => tx.send(Message::Work(item)).map_err(|e| e.0),
        };

        result.map_err(|message| match message {
            Message::Work(item) => item,
            Message::Stop => unreachable!("pushed a work item"),
        })
    }

    /// Enqueue the stop marker. Returns false if the consumer is already gone.
    pub async fn stop(&self) -> bool {
        match self {
            QueueSender::Bounded(tx) => tx.send(Message::Stop).await.is_ok(),
            QueueSender::Unbounded(tx) => tx.send(Message::Stop).is_ok(),
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            QueueSender::Bounded(tx) => tx.is_closed(),
            QueueSender::Unbounded(tx) => tx.is_closed(),
        }
    }
}

/// Consumer side, owned by exactly one worker
#[derive(Debug)]
pub enum QueueReceiver<T> {
    Bounded(mpsc::Receiver<Message<T>>),
    Unbounded(mpsc::UnboundedReceiver<Message<T>>),
}

impl<T> QueueReceiver<T> {
    /// Wait for the next message; `None` once every sender is dropped
    pub async fn recv(&mut self) -> Option<Message<T>> {
        match self {
            QueueReceiver::Bounded(rx) => rx.recv().await,
            QueueReceiver::Unbounded(rx) => rx.recv().await,
        }
    }

    /// Refuse further messages and return the work items still buffered.
    ///
    /// Waits for senders that already hold a reserved slot, so nothing accepted
    /// before the close is lost.
    pub async fn close_and_drain(&mut self) -> Vec<T> {
        match self {
            QueueReceiver::Bounded(rx) => rx.close(),
            QueueReceiver::Unbounded(rx) => rx.close(),
        }

        let mut remaining = Vec::new();
        while let Some(message) = self.recv().await {
            if let Message::Work(item) = message {
                remaining.push(item);
            }
        }
        remaining
    }
}
