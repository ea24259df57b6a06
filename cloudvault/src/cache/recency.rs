//! In-memory recency index for cache entries.
//!
//! Tracks every locally cached object with its size and a monotonically
//! non-decreasing recency score (epoch milliseconds), enabling strict
//! least-recently-used eviction without filesystem scanning.
//!
//! # Lifecycle
//!
//! The index is ephemeral (in-memory only):
//! - Rebuilt from disk on startup via [`RecencyIndex::insert_with_score`],
//!   driven by a [`DiskStore`](super::DiskStore) scan with file mtimes as
//!   the initial scores
//! - Kept in sync via `record()`, `touch()`, `remove()` during operation
//!
//! Invariant: a key should appear here if and only if its bytes are on
//! local disk. Partial failures can break this temporarily; readers
//! existence-check the store rather than trusting the index alone.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use dashmap::DashMap;

/// Minimal metadata tracked per cache entry.
#[derive(Debug, Clone)]
pub struct EntryMetadata {
    /// Size of the cached bytes.
    pub size_bytes: u64,
    /// Recency score: epoch milliseconds of the last admission or hit.
    pub score: i64,
}

/// Statistics from rebuilding the index at startup.
#[derive(Debug, Default)]
pub struct PopulateStats {
    /// Number of entries indexed.
    pub entries_indexed: u64,
    /// Total size in bytes.
    pub total_bytes: u64,
}

/// Thread-safe recency index.
///
/// Uses `DashMap` for concurrent access and `AtomicU64` counters for
/// size and entry totals.
pub struct RecencyIndex {
    entries: DashMap<String, EntryMetadata>,
    total_size: AtomicU64,
    entry_count: AtomicU64,
}

impl RecencyIndex {
    /// Create a new empty index.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            total_size: AtomicU64::new(0),
            entry_count: AtomicU64::new(0),
        }
    }

    /// Record a new entry or refresh an existing one with score = now.
    pub fn record(&self, key: &str, size: u64) {
        self.insert_with_score(key, size, Utc::now().timestamp_millis());
    }

    /// Insert an entry with an explicit score.
    ///
    /// Used during startup population, where file mtimes approximate the
    /// last access time.
    pub fn insert_with_score(&self, key: &str, size: u64, score: i64) {
        let metadata = EntryMetadata {
            size_bytes: size,
            score,
        };

        if let Some(old) = self.entries.insert(key.to_string(), metadata) {
            // Updating existing entry - adjust size delta
            let old_size = old.size_bytes;
            if size > old_size {
                self.total_size
                    .fetch_add(size - old_size, Ordering::Relaxed);
            } else {
                self.total_size
                    .fetch_sub(old_size - size, Ordering::Relaxed);
            }
        } else {
            self.total_size.fetch_add(size, Ordering::Relaxed);
            self.entry_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Refresh the recency score of an existing entry to now.
    ///
    /// Does nothing if the key is not indexed.
    pub fn touch(&self, key: &str) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.score = Utc::now().timestamp_millis();
        }
    }

    /// Remove an entry from the index.
    ///
    /// Returns the removed metadata, or `None` if the key was not indexed.
    pub fn remove(&self, key: &str) -> Option<EntryMetadata> {
        if let Some((_, metadata)) = self.entries.remove(key) {
            self.total_size
                .fetch_sub(metadata.size_bytes, Ordering::Relaxed);
            self.entry_count.fetch_sub(1, Ordering::Relaxed);
            Some(metadata)
        } else {
            None
        }
    }

    /// Check if a key is indexed.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Get the lowest-scored (least recently used) entry.
    ///
    /// Ties on score are broken by the lexically smallest key, so eviction
    /// order is deterministic even when scores collide.
    pub fn oldest(&self) -> Option<(String, EntryMetadata)> {
        let mut oldest: Option<(String, EntryMetadata)> = None;

        for entry in self.entries.iter() {
            let replace = match &oldest {
                None => true,
                Some((key, meta)) => {
                    entry.value().score < meta.score
                        || (entry.value().score == meta.score && entry.key() < key)
                }
            };
            if replace {
                oldest = Some((entry.key().clone(), entry.value().clone()));
            }
        }

        oldest
    }

    /// Get the current score of an entry, if indexed.
    pub fn score(&self, key: &str) -> Option<i64> {
        self.entries.get(key).map(|e| e.score)
    }

    /// Total size of all indexed entries in bytes.
    pub fn total_size(&self) -> u64 {
        self.total_size.load(Ordering::Relaxed)
    }

    /// Number of indexed entries.
    pub fn entry_count(&self) -> u64 {
        self.entry_count.load(Ordering::Relaxed)
    }

    /// Rebuild the index from `(key, size, score)` records, typically a
    /// startup scan of the cache directory with mtimes as scores.
    pub fn populate(&self, records: impl IntoIterator<Item = (String, u64, i64)>) -> PopulateStats {
        let mut stats = PopulateStats::default();
        for (key, size, score) in records {
            self.insert_with_score(&key, size, score);
            stats.entries_indexed += 1;
            stats.total_bytes += size;
        }
        stats
    }
}

impl Default for RecencyIndex {
    fn default() -> Self {
        Self::new()
    }
}
