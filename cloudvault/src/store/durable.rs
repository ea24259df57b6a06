//! Durable object store boundary.
//!
//! The durable store is treated as slow, opaque and authoritative: `put`
//! resolves only once the store has acknowledged the full object (the
//! durable commit point), and any local cache entry may legally vanish
//! without the durable store noticing.

use std::future::Future;
use std::io;
use std::pin::Pin;

use bytes::Bytes;
use dashmap::DashMap;
use futures::stream::{self, BoxStream, StreamExt};
use tracing::debug;

use super::types::StoreError;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A stream of object bytes.
///
/// Chunks are `Bytes`; an `Err` item aborts the transfer.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// Authoritative backing store for object content.
pub trait DurableStore: Send + Sync {
    /// Store an object, consuming the body stream.
    ///
    /// Resolves only after the store acknowledges the complete object.
    /// If the body stream yields an error the put fails and no object is
    /// committed.
    fn put(
        &self,
        key: &str,
        body: ByteStream,
        content_type: &str,
    ) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Fetch an object's bytes as a stream.
    ///
    /// Fails with [`StoreError::NotFound`] for unknown keys.
    fn get(&self, key: &str) -> BoxFuture<'_, Result<ByteStream, StoreError>>;
}

/// Chunk size used when streaming objects back out of [`MemoryStore`].
const GET_CHUNK_BYTES: usize = 64 * 1024;

/// In-memory durable store for tests and local runs.
///
/// Stores whole objects in a concurrent map; `get` streams them back in
/// fixed-size chunks so consumers exercise real multi-chunk behavior.
#[derive(Default)]
pub struct MemoryStore {
    objects: DashMap<String, StoredObject>,
}

struct StoredObject {
    content_type: String,
    data: Bytes,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object directly, bypassing the streaming path.
    pub fn insert(&self, key: &str, content_type: &str, data: impl Into<Bytes>) {
        self.objects.insert(
            key.to_string(),
            StoredObject {
                content_type: content_type.to_string(),
                data: data.into(),
            },
        );
    }

    /// Remove an object, simulating an out-of-band delete.
    pub fn delete(&self, key: &str) -> bool {
        self.objects.remove(key).is_some()
    }

    /// Whether an object exists.
    pub fn contains(&self, key: &str) -> bool {
        self.objects.contains_key(key)
    }

    /// The stored bytes for a key, if present.
    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.objects.get(key).map(|o| o.data.clone())
    }

    /// The stored content type for a key, if present.
    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects.get(key).map(|o| o.content_type.clone())
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl DurableStore for MemoryStore {
    fn put(
        &self,
        key: &str,
        mut body: ByteStream,
        content_type: &str,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        let key = key.to_string();
        let content_type = content_type.to_string();

        Box::pin(async move {
            let mut data = Vec::new();
            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(|e| StoreError::WriteFailed(e.to_string()))?;
                data.extend_from_slice(&chunk);
            }

            debug!(key = %key, size = data.len(), "memory store committed object");
            self.objects.insert(
                key,
                StoredObject {
                    content_type,
                    data: Bytes::from(data),
                },
            );
            Ok(())
        })
    }

    fn get(&self, key: &str) -> BoxFuture<'_, Result<ByteStream, StoreError>> {
        let key = key.to_string();

        Box::pin(async move {
            let data = self
                .objects
                .get(&key)
                .map(|o| o.data.clone())
                .ok_or(StoreError::NotFound(key))?;

            let chunks: Vec<io::Result<Bytes>> = data
                .chunks(GET_CHUNK_BYTES)
                .map(|c| Ok(Bytes::copy_from_slice(c)))
                .collect();

            Ok(stream::iter(chunks).boxed())
        })
    }
}
