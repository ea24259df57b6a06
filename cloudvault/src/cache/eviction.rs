//! Capacity-bounded admission and LRU eviction.
//!
//! The eviction manager is the only component allowed to evict: the
//! ingestion and resolution pipelines add and refresh entries but route
//! every capacity decision through [`EvictionManager::admit`] or
//! [`EvictionManager::reclaim`].
//!
//! # Concurrency
//!
//! Admission for one incoming object is a single atomic unit. The usage
//! check, the eviction loop and the final room-available determination all
//! run under one `tokio::sync::Mutex`, so two concurrent admissions can
//! never both claim the same freed bytes.
//!
//! An admitted object's bytes are not on disk yet when `admit` returns, so
//! each admission holds a byte reservation (an [`AdmissionPermit`]) that
//! counts toward usage until the write completes or is abandoned. Without
//! it, two admissions racing between check and write could overcommit the
//! budget.
//!
//! On-disk usage is recomputed by scanning the store directory on every
//! admission rather than trusting a running counter, tolerating
//! out-of-band deletes and crashed partial writes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::recency::RecencyIndex;
use super::store::DiskStore;
use super::types::CacheError;

/// Outcome of one admission or reclaim run.
#[derive(Debug, Clone, Default)]
pub struct AdmissionReport {
    /// On-disk store usage observed at entry.
    pub usage_before: u64,
    /// Number of entries evicted to make room.
    pub evicted_entries: usize,
    /// Total bytes freed by eviction.
    pub bytes_freed: u64,
}

/// Byte reservation held between admission and write completion.
///
/// Dropping the permit releases the reservation; call it explicitly via
/// [`release`](Self::release) once the object's bytes are on disk (or the
/// write was abandoned) to make the hand-off visible at the call site.
#[derive(Debug)]
pub struct AdmissionPermit {
    pending: Arc<AtomicU64>,
    size: u64,
    /// Report from the admission that granted this permit.
    pub report: AdmissionReport,
}

impl AdmissionPermit {
    /// Release the reservation.
    pub fn release(self) {
        // Drop impl does the accounting.
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.pending.fetch_sub(self.size, Ordering::Relaxed);
    }
}

/// Enforces the cache byte budget via strict LRU eviction.
pub struct EvictionManager {
    store: Arc<DiskStore>,
    index: Arc<RecencyIndex>,
    capacity_bytes: u64,
    /// Bytes admitted but not yet resident on disk.
    pending: Arc<AtomicU64>,
    /// Serializes the check-evict-decide sequence across admissions.
    admission: Mutex<()>,
}

impl EvictionManager {
    /// Create a manager enforcing `capacity_bytes` over the given store.
    pub fn new(store: Arc<DiskStore>, index: Arc<RecencyIndex>, capacity_bytes: u64) -> Self {
        Self {
            store,
            index,
            capacity_bytes,
            pending: Arc::new(AtomicU64::new(0)),
            admission: Mutex::new(()),
        }
    }

    /// Configured capacity in bytes.
    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes
    }

    /// Ensure room for an incoming object of `incoming_size` bytes.
    ///
    /// Evicts least-recently-used entries until
    /// `usage + pending + incoming_size <= capacity`, or fails with
    /// [`CacheError::CapacityUnsatisfiable`] when no evictable entries
    /// remain. Must be called before any bytes of the incoming object are
    /// written locally. The returned permit reserves the incoming bytes
    /// until released.
    pub async fn admit(&self, incoming_size: u64) -> Result<AdmissionPermit, CacheError> {
        // Fail fast: a single object larger than the whole cache can never fit.
        if incoming_size > self.capacity_bytes {
            return Err(CacheError::CapacityUnsatisfiable {
                incoming: incoming_size,
                capacity: self.capacity_bytes,
            });
        }

        let report = self.evict_until_room(incoming_size).await?;
        self.pending.fetch_add(incoming_size, Ordering::Relaxed);

        Ok(AdmissionPermit {
            pending: Arc::clone(&self.pending),
            size: incoming_size,
            report,
        })
    }

    /// Evict until current usage alone fits the budget.
    ///
    /// Used after read-through replenishment, which writes bytes without a
    /// prior admission and may push the store over capacity.
    pub async fn reclaim(&self) -> Result<AdmissionReport, CacheError> {
        self.evict_until_room(0).await
    }

    async fn evict_until_room(&self, incoming_size: u64) -> Result<AdmissionReport, CacheError> {
        let _guard = self.admission.lock().await;

        let usage_before = self.store.usage().await?;
        let mut usage = usage_before;
        let mut report = AdmissionReport {
            usage_before,
            ..Default::default()
        };

        while usage + self.pending.load(Ordering::Relaxed) + incoming_size > self.capacity_bytes {
            let Some((victim, meta)) = self.index.oldest() else {
                // Nothing left to evict. For reclaim (incoming 0) the excess
                // is orphaned files outside the index; leave them and warn.
                if incoming_size == 0 {
                    warn!(
                        usage_bytes = usage,
                        capacity_bytes = self.capacity_bytes,
                        "store over capacity with no indexed entries to evict"
                    );
                    return Ok(report);
                }
                return Err(CacheError::CapacityUnsatisfiable {
                    incoming: incoming_size,
                    capacity: self.capacity_bytes,
                });
            };

            let freed = match self.store.remove(&victim).await? {
                Some(bytes) => bytes,
                // Drift: indexed but already gone from disk.
                None => {
                    debug!(key = %victim, "evicting index record with no local bytes");
                    0
                }
            };
            self.index.remove(&victim);

            usage = usage.saturating_sub(freed);
            report.evicted_entries += 1;
            report.bytes_freed += freed;

            debug!(
                key = %victim,
                freed_bytes = freed,
                score = meta.score,
                usage_bytes = usage,
                "evicted least-recently-used entry"
            );
        }

        if report.evicted_entries > 0 {
            info!(
                evicted = report.evicted_entries,
                bytes_freed = report.bytes_freed,
                usage_before = report.usage_before,
                usage_after = usage,
                incoming_bytes = incoming_size,
                "eviction complete"
            );
        }

        Ok(report)
    }
}
