//! Background invalidation listener daemon.
//!
//! Long-polls the notification feed and purges local cache state for every
//! object-change record it sees. Runs until cancelled, in the same shape
//! as the other background daemons: a `tokio::select!` loop with a biased
//! shutdown arm.
//!
//! # State machine
//!
//! The listener is an explicit state machine rather than a
//! self-rescheduling callback:
//!
//! ```text
//! Idle -> Polling -> Processing -> Polling (loop)
//!                 \-> Idle (on shutdown)
//! ```
//!
//! The current state is observable through [`ListenerStateCell`], which
//! tests use to assert lifecycle transitions.
//!
//! # Delivery semantics
//!
//! A message is acknowledged only after every record in it processed
//! successfully; on any failure the message is left unacknowledged so the
//! feed redelivers it. Invalidating an absent key is a no-op, so
//! redelivery never corrupts state (at-least-once, idempotent).

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{CacheError, DiskStore, RecencyIndex};
use crate::config::FeedPollConfig;
use crate::store::BoxFuture;

use super::feed::NotificationFeed;
use super::types::{ChangeEvent, FeedMessage};

/// Pause after a failed receive before polling again.
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Listener lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ListenerState {
    /// Not running (before start or after shutdown).
    Idle = 0,
    /// Waiting on the feed for a batch.
    Polling = 1,
    /// Working through a received batch.
    Processing = 2,
}

/// Shared, observable listener state.
#[derive(Clone, Default)]
pub struct ListenerStateCell(Arc<AtomicU8>);

impl ListenerStateCell {
    /// Current state.
    pub fn get(&self) -> ListenerState {
        match self.0.load(Ordering::Relaxed) {
            1 => ListenerState::Polling,
            2 => ListenerState::Processing,
            _ => ListenerState::Idle,
        }
    }

    fn set(&self, state: ListenerState) {
        self.0.store(state as u8, Ordering::Relaxed);
    }
}

/// Consumes change notifications and purges stale local cache state.
pub struct InvalidationListener {
    store: Arc<DiskStore>,
    index: Arc<RecencyIndex>,
    feed: Arc<dyn NotificationFeed>,
    poll: FeedPollConfig,
    state: ListenerStateCell,
}

impl InvalidationListener {
    /// Create a listener over the given cache state and feed.
    pub fn new(
        store: Arc<DiskStore>,
        index: Arc<RecencyIndex>,
        feed: Arc<dyn NotificationFeed>,
        poll: FeedPollConfig,
    ) -> Self {
        Self {
            store,
            index,
            feed,
            poll,
            state: ListenerStateCell::default(),
        }
    }

    /// Handle to the observable listener state.
    pub fn state_cell(&self) -> ListenerStateCell {
        self.state.clone()
    }

    /// Remove a key's local cache state.
    ///
    /// Idempotent: a key with no local entry is a no-op, never an error.
    pub async fn invalidate_key(&self, key: &str) -> Result<(), CacheError> {
        match self.store.remove(key).await? {
            Some(bytes) => {
                info!(key = %key, freed_bytes = bytes, "invalidated stale cache entry")
            }
            None => debug!(key = %key, "invalidation for key with no local entry"),
        }
        self.index.remove(key);
        Ok(())
    }

    /// Process every record in one message.
    ///
    /// Returns the number of keys invalidated. Any error means the caller
    /// must not acknowledge the message.
    pub async fn process_message(&self, message: &FeedMessage) -> Result<usize, CacheError> {
        let mut invalidated = 0;

        for event in &message.events {
            match event {
                ChangeEvent::Test => {
                    debug!(handle = %message.handle, "ignoring feed test event");
                }
                // Created and Removed invalidate identically: any durable
                // mutation makes the local copy untrustworthy.
                ChangeEvent::Object { key, kind } => {
                    debug!(key = %key, kind = ?kind, "durable store change notification");
                    self.invalidate_key(key).await?;
                    invalidated += 1;
                }
            }
        }

        Ok(invalidated)
    }

    fn poll_feed(&self) -> BoxFuture<'_, Result<Vec<FeedMessage>, super::types::FeedError>> {
        self.feed.receive(self.poll.max_batch, self.poll.max_wait)
    }

    /// Run the listener until the token is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            max_batch = self.poll.max_batch,
            max_wait_secs = self.poll.max_wait.as_secs(),
            "invalidation listener starting"
        );

        loop {
            self.state.set(ListenerState::Polling);

            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("invalidation listener shutting down");
                    break;
                }

                batch = self.poll_feed() => {
                    match batch {
                        Ok(messages) => {
                            if messages.is_empty() {
                                continue;
                            }
                            self.state.set(ListenerState::Processing);
                            for message in &messages {
                                self.handle_message(message).await;
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "feed receive failed");
                            tokio::time::sleep(RECEIVE_ERROR_BACKOFF).await;
                        }
                    }
                }
            }
        }

        self.state.set(ListenerState::Idle);
    }

    async fn handle_message(&self, message: &FeedMessage) {
        match self.process_message(message).await {
            Ok(invalidated) => {
                if let Err(e) = self.feed.acknowledge(&message.handle).await {
                    // Redelivery will reprocess; invalidation is idempotent.
                    warn!(handle = %message.handle, error = %e, "failed to acknowledge message");
                } else {
                    debug!(
                        handle = %message.handle,
                        invalidated = invalidated,
                        "message processed and acknowledged"
                    );
                }
            }
            Err(e) => {
                // Leave unacknowledged so the feed redelivers it.
                warn!(handle = %message.handle, error = %e, "message processing failed");
            }
        }
    }
}
