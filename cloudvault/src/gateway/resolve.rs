//! Resolution pipeline: read-through download.
//!
//! A hit requires both the index record and the on-disk bytes; when they
//! disagree the stale index record is removed and the request falls
//! through to the miss path (drift healing). A miss fetches from the
//! durable store and tees the bytes to the caller and to a replenishment
//! writer.
//!
//! # Replenishment lifetime
//!
//! The replenishment task owns the remote stream and the cache file
//! handle. The caller only holds the receiving end of a channel, so a
//! caller that disconnects mid-download stops receiving chunks while the
//! task keeps draining the remote stream into the cache. The next request
//! for the key is a hit either way.

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::store::{ByteStream, StoreError};

use super::types::{CacheOutcome, Download, GatewayError};
use super::{Gateway, TEE_CHANNEL_DEPTH};

impl Gateway {
    /// Resolve an object, preferring the local cache.
    ///
    /// With `bypass_cache` set, a cached entry is served straight from the
    /// durable store without touching its recency; an uncached key still
    /// replenishes, since the fetched bytes are paid for either way.
    pub async fn download(&self, key: &str, bypass_cache: bool) -> Result<Download, GatewayError> {
        if bypass_cache {
            if self.is_cached(key).await {
                // Passthrough: no replenishment, no recency refresh.
                debug!(key = %key, "bypass requested, serving durable copy");
                let stream = self.fetch_durable(key).await?;
                return Ok(Download {
                    outcome: CacheOutcome::Miss,
                    stream,
                });
            }
        } else if self.index.contains(key) {
            match self.store.reader(key).await {
                Ok(reader) => {
                    self.index.touch(key);
                    debug!(key = %key, "cache hit");
                    return Ok(Download {
                        outcome: CacheOutcome::Hit,
                        stream: reader.boxed(),
                    });
                }
                Err(e) => {
                    // Index says cached, disk disagrees. Heal and fall
                    // through to the miss path.
                    warn!(key = %key, error = %e, "healing stale index record");
                    self.index.remove(key);
                }
            }
        }

        debug!(key = %key, "cache miss, fetching from durable store");
        let remote = self.fetch_durable(key).await?;
        let stream = self.replenishing_tee(key, remote);

        Ok(Download {
            outcome: CacheOutcome::Miss,
            stream,
        })
    }

    async fn fetch_durable(&self, key: &str) -> Result<ByteStream, GatewayError> {
        self.durable.get(key).await.map_err(|e| match e {
            StoreError::NotFound(key) => GatewayError::NotFound { key },
            source => GatewayError::DurableRead {
                key: key.to_string(),
                source,
            },
        })
    }

    /// Tee a remote stream to the caller while writing it into the cache.
    fn replenishing_tee(&self, key: &str, mut remote: ByteStream) -> ByteStream {
        let (tx, mut rx) = tokio::sync::mpsc::channel(TEE_CHANNEL_DEPTH);

        let store = std::sync::Arc::clone(&self.store);
        let index = std::sync::Arc::clone(&self.index);
        let eviction = std::sync::Arc::clone(&self.eviction);
        let key = key.to_string();

        tokio::spawn(async move {
            let mut writer = match store.writer(&key).await {
                Ok(writer) => Some(writer),
                Err(e) => {
                    warn!(key = %key, error = %e, "replenishment writer unavailable");
                    None
                }
            };

            while let Some(chunk) = remote.next().await {
                match chunk {
                    Ok(bytes) => {
                        // A disconnected caller closes the channel; keep
                        // replenishing regardless.
                        let _ = tx.send(Ok(bytes.clone())).await;
                        if let Some(w) = writer.as_mut() {
                            if let Err(e) = w.write_chunk(&bytes).await {
                                warn!(key = %key, error = %e, "replenishment write failed");
                                if let Some(w) = writer.take() {
                                    w.abort().await;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        // Truncated source: never cache a partial object.
                        warn!(key = %key, error = %e, "durable stream failed mid-transfer");
                        if let Some(w) = writer.take() {
                            w.abort().await;
                        }
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }

            if let Some(w) = writer.take() {
                match w.finish().await {
                    Ok(written) => {
                        index.record(&key, written);
                        info!(key = %key, size_bytes = written, "cache entry replenished");
                        // Replenishment writes without prior admission and
                        // may push the store over budget.
                        if let Err(e) = eviction.reclaim().await {
                            warn!(key = %key, error = %e, "post-replenishment reclaim failed");
                        }
                    }
                    Err(e) => warn!(key = %key, error = %e, "replenishment finalize failed"),
                }
            }
        });

        stream::poll_fn(move |cx| rx.poll_recv(cx)).boxed()
    }
}
