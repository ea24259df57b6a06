//! Notification feed boundary.
//!
//! The feed delivers batches of durable-store change messages with long
//! polling. Messages stay in flight until acknowledged; unacknowledged
//! messages are redelivered, giving at-least-once invalidation.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;

use crate::store::BoxFuture;

use super::types::{FeedError, FeedMessage};

/// Source of durable-store change notifications.
pub trait NotificationFeed: Send + Sync {
    /// Receive up to `max_batch` messages, waiting at most `max_wait`.
    ///
    /// Returns an empty batch when the wait elapses with nothing queued.
    fn receive(
        &self,
        max_batch: usize,
        max_wait: Duration,
    ) -> BoxFuture<'_, Result<Vec<FeedMessage>, FeedError>>;

    /// Acknowledge a message so it is not redelivered.
    fn acknowledge(&self, handle: &str) -> BoxFuture<'_, Result<(), FeedError>>;
}

/// In-memory notification feed for tests and local runs.
///
/// Received messages move to an in-flight set; callers can requeue
/// unacknowledged messages to simulate feed redelivery.
#[derive(Default)]
pub struct MemoryFeed {
    state: Mutex<FeedState>,
    available: Notify,
}

#[derive(Default)]
struct FeedState {
    queue: VecDeque<FeedMessage>,
    in_flight: HashMap<String, FeedMessage>,
}

impl MemoryFeed {
    /// Create an empty feed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a message for delivery.
    pub fn push(&self, message: FeedMessage) {
        self.state
            .lock()
            .expect("feed lock poisoned")
            .queue
            .push_back(message);
        self.available.notify_one();
    }

    /// Move every unacknowledged in-flight message back to the queue.
    ///
    /// Simulates the redelivery a real feed performs after its visibility
    /// window lapses.
    pub fn redeliver_unacknowledged(&self) -> usize {
        let mut state = self.state.lock().expect("feed lock poisoned");
        let handles: Vec<String> = state.in_flight.keys().cloned().collect();
        let count = handles.len();
        for handle in handles {
            if let Some(msg) = state.in_flight.remove(&handle) {
                state.queue.push_front(msg);
            }
        }
        if count > 0 {
            self.available.notify_one();
        }
        count
    }

    /// Number of messages awaiting delivery.
    pub fn queued(&self) -> usize {
        self.state.lock().expect("feed lock poisoned").queue.len()
    }

    /// Number of delivered but unacknowledged messages.
    pub fn in_flight(&self) -> usize {
        self.state
            .lock()
            .expect("feed lock poisoned")
            .in_flight
            .len()
    }

    fn take_batch(&self, max_batch: usize) -> Vec<FeedMessage> {
        let mut state = self.state.lock().expect("feed lock poisoned");
        let mut batch = Vec::new();
        while batch.len() < max_batch {
            let Some(msg) = state.queue.pop_front() else {
                break;
            };
            state.in_flight.insert(msg.handle.clone(), msg.clone());
            batch.push(msg);
        }
        batch
    }
}

impl NotificationFeed for MemoryFeed {
    fn receive(
        &self,
        max_batch: usize,
        max_wait: Duration,
    ) -> BoxFuture<'_, Result<Vec<FeedMessage>, FeedError>> {
        Box::pin(async move {
            let batch = self.take_batch(max_batch);
            if !batch.is_empty() {
                return Ok(batch);
            }

            // Long poll: wait for a push, then drain whatever arrived.
            let _ = tokio::time::timeout(max_wait, self.available.notified()).await;
            Ok(self.take_batch(max_batch))
        })
    }

    fn acknowledge(&self, handle: &str) -> BoxFuture<'_, Result<(), FeedError>> {
        let handle = handle.to_string();
        Box::pin(async move {
            // Idempotent: acknowledging an unknown handle is a no-op.
            self.state
                .lock()
                .map_err(|_| FeedError::Acknowledge("lock poisoned".to_string()))?
                .in_flight
                .remove(&handle);
            Ok(())
        })
    }
}
