//! Bounded multi-producer/multi-consumer queue with one-time close.
//!
//! [`BatchQueue`] backs both the job source and the result sink. It wraps a
//! bounded `tokio::sync::mpsc` channel: the sender lives behind a short-held
//! lock so `close()` can drop it, and the receiver lives behind an async
//! mutex so any number of consumers can `take()` from it one at a time.
//!
//! Closing never discards items. Consumers keep draining until the channel
//! is empty, then observe end-of-stream (`None`).

use std::sync::{Mutex, PoisonError};

use fanout_core::config::MAX_QUEUE_CAPACITY;
use tokio::sync::mpsc;

use crate::error::QueueError;

/// Well-known queue names used in logs and errors.
pub const JOB_QUEUE: &str = "jobs";
pub const RESULT_QUEUE: &str = "results";

/// Bounded concurrent queue shared via `Arc<BatchQueue<T>>`.
pub struct BatchQueue<T> {
    name: &'static str,
    capacity: usize,
    sender: Mutex<Option<mpsc::Sender<T>>>,
    receiver: tokio::sync::Mutex<mpsc::Receiver<T>>,
}

impl<T: Send> BatchQueue<T> {
    /// Create a queue holding at most `capacity` items, clamped to
    /// `1..=MAX_QUEUE_CAPACITY`.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_QUEUE_CAPACITY);
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            name,
            capacity,
            sender: Mutex::new(Some(sender)),
            receiver: tokio::sync::Mutex::new(receiver),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Enqueue `item`, waiting while the queue is full.
    ///
    /// Fails with [`QueueError::Closed`] if the queue was closed before the
    /// call. The item is dropped in that case, so the caller must treat the
    /// error as fatal.
    pub async fn put(&self, item: T) -> Result<(), QueueError> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let Some(sender) = sender else {
            return Err(QueueError::Closed { queue: self.name });
        };

        sender
            .send(item)
            .await
            .map_err(|_| QueueError::Closed { queue: self.name })
    }

    /// Dequeue the next item, waiting while the queue is empty and open.
    ///
    /// Returns `None` once the queue is closed and fully drained. Safe to
    /// drop mid-wait (e.g. inside `tokio::select!`): no item is lost.
    pub async fn take(&self) -> Option<T> {
        let mut receiver = self.receiver.lock().await;
        receiver.recv().await
    }

    /// Signal that no more items will be enqueued.
    ///
    /// Idempotent. Items already enqueued, and `put()` calls already past
    /// the closed check, are still delivered.
    pub fn close(&self) {
        let dropped = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if dropped.is_some() {
            tracing::debug!(queue = self.name, "Queue closed");
        }
    }
}

impl<T> std::fmt::Debug for BatchQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchQueue")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
