//! Gateway request/response types and errors.

use thiserror::Error;

use crate::cache::CacheError;
use crate::store::{ByteStream, StoreError};

/// Errors surfaced by gateway operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Local cache failure (admission, disk IO)
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The durable store rejected or failed the write
    #[error("durable write failed for {key}: {source}")]
    DurableWrite { key: String, source: StoreError },

    /// The durable store failed the read
    #[error("durable read failed for {key}: {source}")]
    DurableRead { key: String, source: StoreError },

    /// The object exists nowhere
    #[error("object not found: {key}")]
    NotFound { key: String },
}

/// Where a download was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Served from the local cache.
    Hit,
    /// Served from the durable store.
    Miss,
}

impl CacheOutcome {
    /// Conventional header-style label.
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheOutcome::Hit => "HIT",
            CacheOutcome::Miss => "MISS",
        }
    }
}

/// Result of a successful ingestion.
#[derive(Debug, Clone)]
pub struct UploadReceipt {
    /// Key the object was stored under.
    pub key: String,
    /// Bytes committed to the durable store.
    pub size_bytes: u64,
    /// Entries evicted to admit the object.
    pub evicted_entries: usize,
    /// Whether a local cache copy was written alongside the durable one.
    pub cached_locally: bool,
}

/// A resolved download.
pub struct Download {
    /// Hit or miss tag for the response surface.
    pub outcome: CacheOutcome,
    /// The object bytes.
    pub stream: ByteStream,
}
