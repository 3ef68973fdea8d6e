//! Single-producer queues with a one-shot completion signal
//!
//! Used both for the ingestion queue (source -> router) and for every
//! partition queue (router -> worker). Completion is signalled by consuming
//! the sender, so completing a queue twice cannot be expressed, and dropping
//! the sender on any exit path completes it as well.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Capacity of a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueCapacity {
    /// Pushing never waits
    #[default]
    Unbounded,
    /// Pushing waits while the queue holds this many items
    Bounded(usize),
}

impl QueueCapacity {
    /// `None` means unbounded
    pub fn from_setting(setting: Option<usize>) -> Self {
        match setting {
            Some(capacity) => Self::Bounded(capacity.max(1)),
            None => Self::Unbounded,
        }
    }
}

/// Returned when the consuming side has gone away; carries the item back
#[derive(Debug, PartialEq)]
pub struct QueueClosed<T>(pub T);

/// Result of pulling from a queue
#[derive(Debug, PartialEq)]
pub enum Pull<T> {
    Item(T),
    /// Queue is empty and its producer has signalled completion
    Completed,
    /// Cancellation was requested while waiting
    Cancelled,
}

#[derive(Debug)]
enum SenderInner<T> {
    Unbounded(mpsc::UnboundedSender<T>),
    Bounded(mpsc::Sender<T>),
}

#[derive(Debug)]
enum ReceiverInner<T> {
    Unbounded(mpsc::UnboundedReceiver<T>),
    Bounded(mpsc::Receiver<T>),
}

/// Producing half of a queue
#[derive(Debug)]
pub struct QueueSender<T> {
    inner: SenderInner<T>,
}

/// Consuming half of a queue
#[derive(Debug)]
pub struct QueueReceiver<T> {
    inner: ReceiverInner<T>,
}

/// Create a queue with the given capacity
pub fn channel<T>(capacity: QueueCapacity) -> (QueueSender<T>, QueueReceiver<T>) {
    match capacity {
        QueueCapacity::Unbounded => {
            let (tx, rx) = mpsc::unbounded_channel();
            (
                QueueSender {
                    inner: SenderInner::Unbounded(tx),
                },
                QueueReceiver {
                    inner: ReceiverInner::Unbounded(rx),
                },
            )
        }
        QueueCapacity::Bounded(capacity) => {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            (
                QueueSender {
                    inner: SenderInner::Bounded(tx),
                },
                QueueReceiver {
                    inner: ReceiverInner::Bounded(rx),
                },
            )
        }
    }
}

impl<T> QueueSender<T> {
    /// Push an item. Only a bounded queue that is full ever waits here.
    pub async fn push(&self, item: T) -> Result<(), QueueClosed<T>> {
        match &self.inner {
            SenderInner::Unbounded(tx) => tx.send(item).map_err(|e| QueueClosed(e.0)),
            SenderInner::Bounded(tx) => tx.send(item).await.map_err(|e| QueueClosed(e.0)),
        }
    }

    /// Signal that no more items will be pushed
    pub fn complete(self) {
        drop(self);
    }

    /// True once the consuming side has been dropped or closed
    pub fn is_closed(&self) -> bool {
        match &self.inner {
            SenderInner::Unbounded(tx) => tx.is_closed(),
            SenderInner::Bounded(tx) => tx.is_closed(),
        }
    }
}

impl<T> QueueReceiver<T> {
    /// Receive the next item; `None` once the queue is empty and completed
    pub async fn recv(&mut self) -> Option<T> {
        match &mut self.inner {
            ReceiverInner::Unbounded(rx) => rx.recv().await,
            ReceiverInner::Bounded(rx) => rx.recv().await,
        }
    }

    /// Receive the next item, returning early when `cancel` fires
    pub async fn pull(&mut self, cancel: &CancellationToken) -> Pull<T> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Pull::Cancelled,
            item = self.recv() => match item {
                Some(item) => Pull::Item(item),
                None => Pull::Completed,
            },
        }
    }

    /// Number of items waiting in the queue
    pub fn len(&self) -> usize {
        match &self.inner {
            ReceiverInner::Unbounded(rx) => rx.len(),
            ReceiverInner::Bounded(rx) => rx.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting items; pending items can still be received
    pub fn close(&mut self) {
        match &mut self.inner {
            ReceiverInner::Unbounded(rx) => rx.close(),
            ReceiverInner::Bounded(rx) => rx.close(),
        }
    }
}
