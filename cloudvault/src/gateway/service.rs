//! Lifecycle facade wiring the gateway together.
//!
//! `GatewayService::start` builds the cache stack (disk store, recency
//! index rebuilt from a startup scan, eviction manager), assembles the
//! [`Gateway`] and spawns the invalidation listener daemon. `shutdown`
//! cancels the daemon and waits for it to exit.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cache::{DiskStore, EvictionManager, RecencyIndex};
use crate::config::GatewayConfig;
use crate::invalidate::{InvalidationListener, ListenerState, ListenerStateCell, NotificationFeed};
use crate::store::{DurableStore, MetadataStore};

use super::types::GatewayError;
use super::Gateway;

/// A running gateway with its background invalidation listener.
pub struct GatewayService {
    gateway: Arc<Gateway>,
    shutdown: CancellationToken,
    listener: JoinHandle<()>,
    listener_state: ListenerStateCell,
}

impl GatewayService {
    /// Build the cache stack and start the invalidation listener.
    ///
    /// The recency index is rebuilt from the cache directory, with file
    /// mtimes standing in for last-access times, so cached entries survive
    /// restarts. Anything left over capacity (say, after the budget was
    /// lowered) is evicted before the service accepts work.
    pub async fn start(
        config: GatewayConfig,
        durable: Arc<dyn DurableStore>,
        metadata: Arc<dyn MetadataStore>,
        feed: Arc<dyn NotificationFeed>,
    ) -> Result<Self, GatewayError> {
        let store = Arc::new(DiskStore::new(config.cache_dir.clone())?);
        let index = Arc::new(RecencyIndex::new());

        let scan = store.scan().await?;
        let stats = index.populate(
            scan.into_iter()
                .map(|e| (e.key, e.size_bytes, e.modified_millis)),
        );
        info!(
            entries = stats.entries_indexed,
            total_bytes = stats.total_bytes,
            cache_dir = %config.cache_dir.display(),
            "cache index rebuilt from disk"
        );

        let eviction = Arc::new(EvictionManager::new(
            Arc::clone(&store),
            Arc::clone(&index),
            config.capacity_bytes,
        ));

        let report = eviction.reclaim().await?;
        if report.evicted_entries > 0 {
            warn!(
                evicted = report.evicted_entries,
                bytes_freed = report.bytes_freed,
                "startup eviction trimmed cache to budget"
            );
        }

        let gateway = Arc::new(Gateway::new(
            Arc::clone(&store),
            Arc::clone(&index),
            eviction,
            durable,
            metadata,
        ));

        let listener = InvalidationListener::new(store, index, feed, config.poll);
        let listener_state = listener.state_cell();
        let shutdown = CancellationToken::new();
        let listener = tokio::spawn(listener.run(shutdown.clone()));

        info!(
            capacity_bytes = config.capacity_bytes,
            "gateway service started"
        );

        Ok(Self {
            gateway,
            shutdown,
            listener,
            listener_state,
        })
    }

    /// Handle to the gateway for upload/download calls.
    pub fn gateway(&self) -> Arc<Gateway> {
        Arc::clone(&self.gateway)
    }

    /// Current invalidation listener state.
    pub fn listener_state(&self) -> ListenerState {
        self.listener_state.get()
    }

    /// Stop the invalidation listener and wait for it to exit.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.listener.await {
            warn!(error = %e, "invalidation listener task panicked");
        }
        info!("gateway service stopped");
    }
}
