//! Write-through / read-through gateway core.
//!
//! The [`Gateway`] fronts a durable object store with a byte-budgeted
//! local cache. Uploads commit durably and cache locally in one streaming
//! pass; downloads serve from the cache when possible and replenish it
//! from the durable store when not. A background listener (see
//! [`crate::invalidate`]) keeps the cache coherent with out-of-band
//! durable-store mutations.
//!
//! # Pipelines
//!
//! - Ingestion ([`Gateway::upload`]): admission first, then one
//!   backpressure-coupled tee feeding the durable store and the local
//!   disk; the durable acknowledgement is the commit point.
//! - Resolution ([`Gateway::download`]): index-plus-disk hit check,
//!   drift-healing, and miss replenishment whose lifetime is decoupled
//!   from the caller.
//!
//! [`GatewayService`] wires the pieces together and owns the daemon
//! lifecycle.

mod ingest;
mod resolve;
mod service;
mod types;

pub use service::GatewayService;
pub use types::{CacheOutcome, Download, GatewayError, UploadReceipt};

use std::sync::Arc;

use crate::cache::{DiskStore, EvictionManager, RecencyIndex};
use crate::store::{DurableStore, MetadataStore};

/// Depth of the per-sink chunk channels used by the tee pipelines.
///
/// Small on purpose: the source must run at the pace of the slower sink
/// rather than buffering unboundedly.
const TEE_CHANNEL_DEPTH: usize = 8;

/// Core gateway over a durable store and a local byte-budgeted cache.
pub struct Gateway {
    store: Arc<DiskStore>,
    index: Arc<RecencyIndex>,
    eviction: Arc<EvictionManager>,
    durable: Arc<dyn DurableStore>,
    metadata: Arc<dyn MetadataStore>,
}

impl Gateway {
    /// Assemble a gateway from its parts.
    pub fn new(
        store: Arc<DiskStore>,
        index: Arc<RecencyIndex>,
        eviction: Arc<EvictionManager>,
        durable: Arc<dyn DurableStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        Self {
            store,
            index,
            eviction,
            durable,
            metadata,
        }
    }

    /// Configured cache capacity in bytes.
    pub fn capacity_bytes(&self) -> u64 {
        self.eviction.capacity_bytes()
    }

    /// Current on-disk cache usage in bytes.
    pub async fn usage(&self) -> Result<u64, GatewayError> {
        Ok(self.store.usage().await?)
    }

    /// Number of indexed cache entries.
    pub fn entry_count(&self) -> u64 {
        self.index.entry_count()
    }

    /// Whether a key currently has a full local cache entry.
    pub async fn is_cached(&self, key: &str) -> bool {
        self.index.contains(key) && self.store.contains(key).await
    }
}
