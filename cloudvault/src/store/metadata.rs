//! Metadata store boundary.
//!
//! One descriptive record is written per successful ingestion. The record
//! is bookkeeping only: cache correctness never depends on it, so callers
//! treat failures as non-fatal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use super::durable::BoxFuture;
use super::types::StoreError;

/// Descriptive record for one ingested object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMetadata {
    /// Original filename supplied by the uploader.
    pub filename: String,
    /// Durable-store key.
    pub key: String,
    /// Object size in bytes.
    pub size_bytes: u64,
    /// MIME type supplied by the uploader.
    pub mime_type: String,
    /// Ingestion time.
    pub created_at: DateTime<Utc>,
}

/// Sink for per-ingestion metadata records.
pub trait MetadataStore: Send + Sync {
    /// Persist one record.
    fn record(&self, metadata: ObjectMetadata) -> BoxFuture<'_, Result<(), StoreError>>;
}

/// In-memory metadata store for tests and local runs.
#[derive(Default)]
pub struct MemoryMetadataStore {
    records: Mutex<Vec<ObjectMetadata>>,
}

impl MemoryMetadataStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// All records written so far.
    pub fn records(&self) -> Vec<ObjectMetadata> {
        self.records.lock().expect("metadata lock poisoned").clone()
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn record(&self, metadata: ObjectMetadata) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            self.records
                .lock()
                .map_err(|_| StoreError::MetadataFailed("lock poisoned".to_string()))?
                .push(metadata);
            Ok(())
        })
    }
}
