//! Notification feed message types.

use thiserror::Error;

/// Errors from the notification feed.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Receiving a batch failed
    #[error("feed receive failed: {0}")]
    Receive(String),

    /// Acknowledging a message failed
    #[error("feed acknowledge failed: {0}")]
    Acknowledge(String),
}

/// The kind of durable-store mutation an event reports.
///
/// Both kinds invalidate identically: any mutation means the local copy
/// can no longer be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Object was created or overwritten
    Created,
    /// Object was removed
    Removed,
}

/// One change record within a feed message.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    /// Connectivity test event; carries no object reference and is ignored.
    Test,
    /// A durable-store object changed.
    Object { key: String, kind: ChangeKind },
}

/// One message from the feed, possibly carrying several change records.
///
/// The handle identifies the message for acknowledgement; an unacknowledged
/// message is redelivered by the feed.
#[derive(Debug, Clone)]
pub struct FeedMessage {
    /// Opaque acknowledgement handle.
    pub handle: String,
    /// Change records in this message.
    pub events: Vec<ChangeEvent>,
}

impl FeedMessage {
    /// Create a message with the given handle and events.
    pub fn new(handle: impl Into<String>, events: Vec<ChangeEvent>) -> Self {
        Self {
            handle: handle.into(),
            events,
        }
    }
}
