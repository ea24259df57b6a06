//! Gateway configuration.
//!
//! All tunables for the cache and the invalidation listener live here.
//! Defaults match a small local deployment; callers override what they
//! need with the `with_*` builders.

use std::path::PathBuf;
use std::time::Duration;

/// Default cache capacity: 100 MB.
pub const DEFAULT_CAPACITY_BYTES: u64 = 100 * 1024 * 1024;

/// Default feed batch size per poll.
pub const DEFAULT_FEED_MAX_BATCH: usize = 10;

/// Default long-poll wait per receive.
pub const DEFAULT_FEED_MAX_WAIT: Duration = Duration::from_secs(20);

/// Long-poll settings for the notification feed.
#[derive(Debug, Clone, Copy)]
pub struct FeedPollConfig {
    /// Maximum messages per receive.
    pub max_batch: usize,
    /// Maximum wait for a non-empty batch.
    pub max_wait: Duration,
}

impl Default for FeedPollConfig {
    fn default() -> Self {
        Self {
            max_batch: DEFAULT_FEED_MAX_BATCH,
            max_wait: DEFAULT_FEED_MAX_WAIT,
        }
    }
}

/// Top-level gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Byte budget for the local cache.
    pub capacity_bytes: u64,
    /// Directory holding cached entries.
    pub cache_dir: PathBuf,
    /// Notification feed polling.
    pub poll: FeedPollConfig,
}

impl GatewayConfig {
    /// Configuration with all defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache byte budget.
    pub fn with_capacity_bytes(mut self, capacity_bytes: u64) -> Self {
        self.capacity_bytes = capacity_bytes;
        self
    }

    /// Set the cache directory.
    pub fn with_cache_dir(mut self, cache_dir: PathBuf) -> Self {
        self.cache_dir = cache_dir;
        self
    }

    /// Set the feed polling parameters.
    pub fn with_poll(mut self, poll: FeedPollConfig) -> Self {
        self.poll = poll;
        self
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: DEFAULT_CAPACITY_BYTES,
            cache_dir: default_cache_dir(),
            poll: FeedPollConfig::default(),
        }
    }
}

/// Platform cache directory for the gateway, falling back to a relative
/// path when the platform reports none.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("cloudvault")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.capacity_bytes, 100 * 1024 * 1024);
        assert_eq!(config.poll.max_batch, 10);
        assert_eq!(config.poll.max_wait, Duration::from_secs(20));
        assert!(config.cache_dir.ends_with("cloudvault"));
    }

    #[test]
    fn builders_override_defaults() {
        let config = GatewayConfig::new()
            .with_capacity_bytes(1_000)
            .with_cache_dir(PathBuf::from("/tmp/vault"))
            .with_poll(FeedPollConfig {
                max_batch: 2,
                max_wait: Duration::from_millis(50),
            });

        assert_eq!(config.capacity_bytes, 1_000);
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/vault"));
        assert_eq!(config.poll.max_batch, 2);
    }
}
