//! Capacity-bounded local cache with LRU eviction.
//!
//! Mirrors a subset of durable-store objects on local disk, tracks recency
//! in memory, and evicts least-recently-used entries when a byte budget
//! would be exceeded.

mod eviction;
mod recency;
mod store;
mod types;

pub use eviction::{AdmissionPermit, AdmissionReport, EvictionManager};
pub use recency::{EntryMetadata, PopulateStats, RecencyIndex};
pub use store::{DiskStore, EntryWriter, ScanEntry};
pub use types::CacheError;
