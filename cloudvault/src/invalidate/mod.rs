//! Asynchronous cache invalidation.
//!
//! The durable store can change out-of-band (deletes, overwrites); a
//! notification feed reports those mutations and the listener purges the
//! affected local cache state. Invalidation is idempotent and processed
//! at-least-once: a message is acknowledged only after every record in it
//! was handled.

mod feed;
mod listener;
mod types;

pub use feed::{MemoryFeed, NotificationFeed};
pub use listener::{InvalidationListener, ListenerState, ListenerStateCell};
pub use types::{ChangeEvent, ChangeKind, FeedError, FeedMessage};
