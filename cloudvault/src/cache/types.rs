//! Cache error types.

use thiserror::Error;

/// Errors from local cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// I/O error during cache operations
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A single incoming object exceeds the total cache capacity, or the
    /// eviction loop ran out of evictable entries before freeing enough room.
    #[error("cannot make room for {incoming} bytes (capacity {capacity})")]
    CapacityUnsatisfiable { incoming: u64, capacity: u64 },

    /// Key cannot be mapped to a local cache file
    #[error("invalid cache key: {0}")]
    InvalidKey(String),
}
