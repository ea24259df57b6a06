//! Ingestion pipeline: write-through upload.
//!
//! One pass over the source stream feeds two sinks, the durable store and
//! the local disk cache. Chunks reach the durable sink through a bounded
//! channel, and the source loop awaits both the channel send and the local
//! write before pulling the next chunk, so the source advances at the pace
//! of the slower sink instead of buffering.
//!
//! The durable acknowledgement is the commit point: upload reports success
//! only after `put` resolves. A local-disk failure mid-stream degrades the
//! upload to durable-only (the object is simply a future cache miss); a
//! durable failure fails the upload and discards the partial local copy.

use bytes::Bytes;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::io;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cache::EntryWriter;
use crate::store::{ByteStream, ObjectMetadata, StoreError};

use super::types::{GatewayError, UploadReceipt};
use super::{Gateway, TEE_CHANNEL_DEPTH};

/// Derive the storage key for an uploaded file.
///
/// `{epoch_millis}-{sanitized filename}`: recency-ordered, unique per
/// millisecond, and traceable back to the original name.
pub(super) fn derive_key(filename: &str) -> String {
    format!("{}-{}", Utc::now().timestamp_millis(), sanitize(filename))
}

/// Replace every character outside `[A-Za-z0-9._-]` with `_`.
fn sanitize(filename: &str) -> String {
    let cleaned: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

impl Gateway {
    /// Ingest an object: commit to the durable store and cache locally.
    ///
    /// Admission runs before any byte of the source is consumed; an
    /// unsatisfiable admission aborts the upload outright. Success means
    /// the durable store acknowledged the complete object.
    pub async fn upload(
        &self,
        body: ByteStream,
        filename: &str,
        mime_type: &str,
        size_bytes: u64,
    ) -> Result<UploadReceipt, GatewayError> {
        let permit = self.eviction.admit(size_bytes).await?;
        let key = derive_key(filename);

        debug!(
            key = %key,
            size_bytes = size_bytes,
            mime_type = %mime_type,
            evicted = permit.report.evicted_entries,
            "admission granted, starting upload"
        );

        let outcome = self.tee_upload(&key, body, mime_type).await;

        let local_bytes = match outcome {
            Ok(local_bytes) => local_bytes,
            Err(source) => {
                return Err(GatewayError::DurableWrite {
                    key,
                    source,
                });
            }
        };

        let cached_locally = match local_bytes {
            Some(written) => {
                self.index.record(&key, written);
                true
            }
            None => false,
        };
        let evicted_entries = permit.report.evicted_entries;
        permit.release();

        // Admission trusted the declared size; a source that streamed more
        // than it declared can leave the store over budget.
        if let Some(written) = local_bytes {
            if written > size_bytes {
                warn!(
                    key = %key,
                    declared_bytes = size_bytes,
                    written_bytes = written,
                    "upload exceeded declared size, re-enforcing budget"
                );
                if let Err(e) = self.eviction.reclaim().await {
                    warn!(key = %key, error = %e, "post-upload reclaim failed");
                }
            }
        }

        // Bookkeeping only; the object is already durable.
        let meta = ObjectMetadata {
            filename: filename.to_string(),
            key: key.clone(),
            size_bytes,
            mime_type: mime_type.to_string(),
            created_at: Utc::now(),
        };
        if let Err(e) = self.metadata.record(meta).await {
            warn!(key = %key, error = %e, "metadata record failed");
        }

        info!(
            key = %key,
            size_bytes = size_bytes,
            cached_locally = cached_locally,
            "upload committed"
        );

        Ok(UploadReceipt {
            key,
            size_bytes,
            evicted_entries,
            cached_locally,
        })
    }

    /// Drive the source through both sinks.
    ///
    /// Returns the local byte count on full success, `None` when only the
    /// local side failed, or the durable error.
    async fn tee_upload(
        &self,
        key: &str,
        mut body: ByteStream,
        mime_type: &str,
    ) -> Result<Option<u64>, StoreError> {
        let (tx, mut rx) = mpsc::channel::<io::Result<Bytes>>(TEE_CHANNEL_DEPTH);

        let durable = std::sync::Arc::clone(&self.durable);
        let durable_key = key.to_string();
        let content_type = mime_type.to_string();
        let durable_task = tokio::spawn(async move {
            let body = stream::poll_fn(move |cx| rx.poll_recv(cx)).boxed();
            durable.put(&durable_key, body, &content_type).await
        });

        let mut local: Option<EntryWriter> = match self.store.writer(key).await {
            Ok(writer) => Some(writer),
            Err(e) => {
                warn!(key = %key, error = %e, "local cache writer unavailable, durable-only upload");
                None
            }
        };

        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => {
                    if tx.send(Ok(bytes.clone())).await.is_err() {
                        // Durable sink stopped consuming: its put failed.
                        break;
                    }
                    if let Some(writer) = local.as_mut() {
                        if let Err(e) = writer.write_chunk(&bytes).await {
                            warn!(key = %key, error = %e, "local cache write failed, continuing durable-only");
                            if let Some(writer) = local.take() {
                                writer.abort().await;
                            }
                        }
                    }
                }
                Err(e) => {
                    // Source died: propagate so the durable put fails too.
                    let _ = tx.send(Err(e)).await;
                    break;
                }
            }
        }
        drop(tx);

        let durable_result = durable_task
            .await
            .map_err(|e| StoreError::WriteFailed(e.to_string()))?;

        match durable_result {
            Ok(()) => match local {
                Some(writer) => {
                    let written = writer.finish().await.map_err(StoreError::Io);
                    match written {
                        Ok(written) => Ok(Some(written)),
                        Err(e) => {
                            warn!(key = %key, error = %e, "local cache finalize failed");
                            Ok(None)
                        }
                    }
                }
                None => Ok(None),
            },
            Err(e) => {
                // No durable copy, so the partial local copy must go too.
                if let Some(writer) = local.take() {
                    writer.abort().await;
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheError, DiskStore, EvictionManager, RecencyIndex};
    use crate::store::{
        BoxFuture, DurableStore, MemoryMetadataStore, MemoryStore, MetadataStore,
    };
    use std::sync::Arc;
    use tempfile::TempDir;

    struct TestContext {
        _temp: TempDir,
        gateway: Gateway,
        store: Arc<DiskStore>,
        index: Arc<RecencyIndex>,
        durable: Arc<MemoryStore>,
        metadata: Arc<MemoryMetadataStore>,
    }

    fn create_test_setup(capacity: u64) -> TestContext {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(DiskStore::new(temp.path().to_path_buf()).unwrap());
        let index = Arc::new(RecencyIndex::new());
        let eviction = Arc::new(EvictionManager::new(
            Arc::clone(&store),
            Arc::clone(&index),
            capacity,
        ));
        let durable = Arc::new(MemoryStore::new());
        let metadata = Arc::new(MemoryMetadataStore::new());

        let gateway = Gateway::new(
            Arc::clone(&store),
            Arc::clone(&index),
            eviction,
            Arc::clone(&durable) as Arc<dyn DurableStore>,
            Arc::clone(&metadata) as Arc<dyn MetadataStore>,
        );

        TestContext {
            _temp: temp,
            gateway,
            store,
            index,
            durable,
            metadata,
        }
    }

    fn body_from(data: &[u8]) -> ByteStream {
        let chunks: Vec<io::Result<Bytes>> = data
            .chunks(7)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        stream::iter(chunks).boxed()
    }

    /// Durable store that always rejects writes.
    struct RejectingStore;

    impl DurableStore for RejectingStore {
        fn put(
            &self,
            _key: &str,
            mut body: ByteStream,
            _content_type: &str,
        ) -> BoxFuture<'_, Result<(), StoreError>> {
            Box::pin(async move {
                // Drain one chunk then fail, like a mid-transfer rejection.
                let _ = body.next().await;
                Err(StoreError::WriteFailed("rejected".to_string()))
            })
        }

        fn get(&self, key: &str) -> BoxFuture<'_, Result<ByteStream, StoreError>> {
            let key = key.to_string();
            Box::pin(async move { Err(StoreError::NotFound(key)) })
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Key derivation
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn key_embeds_sanitized_filename() {
        let key = derive_key("annual report (final).pdf");
        let (_millis, name) = key.split_once('-').unwrap();
        assert_eq!(name, "annual_report__final_.pdf");
    }

    #[test]
    fn key_prefix_is_epoch_millis() {
        let before = Utc::now().timestamp_millis();
        let key = derive_key("a.bin");
        let millis: i64 = key.split_once('-').unwrap().0.parse().unwrap();
        assert!(millis >= before);
    }

    #[test]
    fn empty_filename_gets_placeholder() {
        assert_eq!(sanitize(""), "upload");
        assert_eq!(sanitize("///"), "___");
    }

    // ─────────────────────────────────────────────────────────────────────
    // Upload pipeline
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn upload_commits_both_sinks() {
        let ctx = create_test_setup(1000);
        let data = b"the quick brown fox jumps over the lazy dog";

        let receipt = ctx
            .gateway
            .upload(body_from(data), "fox.txt", "text/plain", data.len() as u64)
            .await
            .unwrap();

        assert!(receipt.cached_locally);
        assert_eq!(receipt.size_bytes, data.len() as u64);
        assert_eq!(
            ctx.durable.object(&receipt.key).unwrap().as_ref(),
            data.as_slice()
        );
        assert!(ctx.store.contains(&receipt.key).await);
        assert!(ctx.index.contains(&receipt.key));

        let records = ctx.metadata.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].filename, "fox.txt");
        assert_eq!(records[0].key, receipt.key);
    }

    #[tokio::test]
    async fn oversized_upload_fails_before_consuming() {
        let ctx = create_test_setup(100);

        let err = ctx
            .gateway
            .upload(body_from(&[0u8; 500]), "big.bin", "application/octet-stream", 500)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            GatewayError::Cache(CacheError::CapacityUnsatisfiable { .. })
        ));
        assert!(ctx.durable.is_empty());
        assert_eq!(ctx.index.entry_count(), 0);
    }

    #[tokio::test]
    async fn upload_evicts_to_make_room() {
        let ctx = create_test_setup(1000);

        ctx.gateway
            .upload(body_from(&[1u8; 600]), "a.bin", "application/octet-stream", 600)
            .await
            .unwrap();
        // Scores are millisecond-granular; nudge time forward.
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let receipt = ctx
            .gateway
            .upload(body_from(&[2u8; 500]), "b.bin", "application/octet-stream", 500)
            .await
            .unwrap();

        assert_eq!(receipt.evicted_entries, 1);
        assert_eq!(ctx.index.entry_count(), 1);
        assert!(ctx.store.usage().await.unwrap() <= 1000);
        // Eviction is local only: the durable store keeps both objects.
        assert_eq!(ctx.durable.len(), 2);
    }

    #[tokio::test]
    async fn undeclared_excess_bytes_trigger_reclaim() {
        let ctx = create_test_setup(1000);

        ctx.gateway
            .upload(body_from(&[1u8; 600]), "a.bin", "application/octet-stream", 600)
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        // Declares 100 bytes, streams 600: admission passes on the hint,
        // the budget is re-enforced once the real size is known.
        let receipt = ctx
            .gateway
            .upload(body_from(&[2u8; 600]), "liar.bin", "application/octet-stream", 100)
            .await
            .unwrap();

        assert!(ctx.store.usage().await.unwrap() <= 1000);
        assert!(ctx.index.contains(&receipt.key));
        assert_eq!(ctx.index.entry_count(), 1);
    }

    #[tokio::test]
    async fn durable_failure_discards_local_partial() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(DiskStore::new(temp.path().to_path_buf()).unwrap());
        let index = Arc::new(RecencyIndex::new());
        let eviction = Arc::new(EvictionManager::new(
            Arc::clone(&store),
            Arc::clone(&index),
            1000,
        ));
        let gateway = Gateway::new(
            Arc::clone(&store),
            Arc::clone(&index),
            eviction,
            Arc::new(RejectingStore),
            Arc::new(MemoryMetadataStore::new()),
        );

        let err = gateway
            .upload(body_from(&[0u8; 200]), "doomed.bin", "application/octet-stream", 200)
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::DurableWrite { .. }));
        assert_eq!(index.entry_count(), 0);
        assert_eq!(store.usage().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn source_error_fails_durable_commit() {
        let ctx = create_test_setup(1000);

        let body: ByteStream = stream::iter(vec![
            Ok(Bytes::from_static(b"first chunk")),
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "client gone")),
        ])
        .boxed();

        let err = ctx
            .gateway
            .upload(body, "broken.bin", "application/octet-stream", 100)
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::DurableWrite { .. }));
        assert!(ctx.durable.is_empty());
        assert_eq!(ctx.store.usage().await.unwrap(), 0);
        assert_eq!(ctx.index.entry_count(), 0);
    }

    #[tokio::test]
    async fn empty_object_uploads() {
        let ctx = create_test_setup(1000);

        let receipt = ctx
            .gateway
            .upload(body_from(b""), "empty.txt", "text/plain", 0)
            .await
            .unwrap();

        assert!(ctx.durable.contains(&receipt.key));
        assert!(ctx.store.contains(&receipt.key).await);
    }
}
