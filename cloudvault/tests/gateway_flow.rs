//! Integration tests for the full gateway lifecycle.
//!
//! These tests drive the assembled service end to end:
//! - upload / download round trips with hit and miss outcomes
//! - the eviction-replenishment cycle under a tight byte budget
//! - feed-driven invalidation followed by read-through recovery
//! - index rebuild across a restart, with mtimes deciding eviction order

use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use tempfile::TempDir;

use cloudvault::config::{FeedPollConfig, GatewayConfig};
use cloudvault::gateway::{CacheOutcome, GatewayService};
use cloudvault::invalidate::{ChangeEvent, ChangeKind, FeedMessage, MemoryFeed};
use cloudvault::store::{ByteStream, MemoryMetadataStore, MemoryStore};

// =============================================================================
// Test Helpers
// =============================================================================

struct TestHarness {
    _cache_dir: TempDir,
    service: GatewayService,
    durable: Arc<MemoryStore>,
    metadata: Arc<MemoryMetadataStore>,
    feed: Arc<MemoryFeed>,
}

async fn start_harness(capacity: u64) -> TestHarness {
    let cache_dir = TempDir::new().unwrap();
    let durable = Arc::new(MemoryStore::new());
    let metadata = Arc::new(MemoryMetadataStore::new());
    let feed = Arc::new(MemoryFeed::new());

    let config = GatewayConfig::new()
        .with_capacity_bytes(capacity)
        .with_cache_dir(cache_dir.path().to_path_buf())
        .with_poll(FeedPollConfig {
            max_batch: 10,
            max_wait: Duration::from_millis(20),
        });

    let service = GatewayService::start(
        config,
        Arc::clone(&durable) as _,
        Arc::clone(&metadata) as _,
        Arc::clone(&feed) as _,
    )
    .await
    .unwrap();

    TestHarness {
        _cache_dir: cache_dir,
        service,
        durable,
        metadata,
        feed,
    }
}

fn body_from(data: &[u8]) -> ByteStream {
    let chunks: Vec<io::Result<Bytes>> = data
        .chunks(1024)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    stream::iter(chunks).boxed()
}

async fn collect(mut stream: ByteStream) -> Vec<u8> {
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk.unwrap());
    }
    out
}

async fn wait_for<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never became true");
}

// =============================================================================
// Round trips
// =============================================================================

#[tokio::test]
async fn upload_then_download_is_a_hit() {
    let harness = start_harness(1024 * 1024).await;
    let gateway = harness.service.gateway();
    let data = b"quarterly numbers".repeat(100);

    let receipt = gateway
        .upload(body_from(&data), "q3.csv", "text/csv", data.len() as u64)
        .await
        .unwrap();

    let download = gateway.download(&receipt.key, false).await.unwrap();
    assert_eq!(download.outcome, CacheOutcome::Hit);
    assert_eq!(collect(download.stream).await, data);

    // Durable copy and metadata record both landed.
    assert_eq!(harness.durable.object(&receipt.key).unwrap(), data);
    let records = harness.metadata.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].mime_type, "text/csv");

    harness.service.shutdown().await;
}

#[tokio::test]
async fn miss_replenishes_and_next_read_hits() {
    let harness = start_harness(1024 * 1024).await;
    let gateway = harness.service.gateway();

    // Object exists durably but was never cached here.
    harness.durable.insert("ext-1", "text/plain", &b"out of band"[..]);

    let download = gateway.download("ext-1", false).await.unwrap();
    assert_eq!(download.outcome, CacheOutcome::Miss);
    assert_eq!(collect(download.stream).await, b"out of band");

    let g = gateway.clone();
    wait_for(move || {
        let g = g.clone();
        async move { g.is_cached("ext-1").await }
    })
    .await;

    let again = gateway.download("ext-1", false).await.unwrap();
    assert_eq!(again.outcome, CacheOutcome::Hit);

    harness.service.shutdown().await;
}

// =============================================================================
// Eviction and replenishment cycle
// =============================================================================

/// Capacity 1000: caching A (600) then B (500) evicts A; a read of A is a
/// miss that replenishes A and evicts B; B then misses in turn.
#[tokio::test]
async fn eviction_replenishment_cycle() {
    let harness = start_harness(1000).await;
    let gateway = harness.service.gateway();

    let a = gateway
        .upload(body_from(&[b'a'; 600]), "a.bin", "application/octet-stream", 600)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let b = gateway
        .upload(body_from(&[b'b'; 500]), "b.bin", "application/octet-stream", 500)
        .await
        .unwrap();

    // Admitting B evicted A; only B is cached.
    assert!(!gateway.is_cached(&a.key).await);
    assert!(gateway.is_cached(&b.key).await);
    assert!(gateway.usage().await.unwrap() <= 1000);

    // Reading A misses, serves from durable, and replenishes.
    let download = gateway.download(&a.key, false).await.unwrap();
    assert_eq!(download.outcome, CacheOutcome::Miss);
    assert_eq!(collect(download.stream).await, vec![b'a'; 600]);

    let g = gateway.clone();
    let a_key = a.key.clone();
    wait_for(move || {
        let g = g.clone();
        let a_key = a_key.clone();
        async move { g.is_cached(&a_key).await && g.usage().await.unwrap() <= 1000 }
    })
    .await;

    // Replenishing A pushed usage to 1100; reclaim evicted B.
    assert!(!gateway.is_cached(&b.key).await);

    // B still resolves through the durable store.
    let download = gateway.download(&b.key, false).await.unwrap();
    assert_eq!(download.outcome, CacheOutcome::Miss);
    assert_eq!(collect(download.stream).await, vec![b'b'; 500]);

    harness.service.shutdown().await;
}

#[tokio::test]
async fn touched_entry_survives_eviction() {
    let harness = start_harness(1000).await;
    let gateway = harness.service.gateway();

    let a = gateway
        .upload(body_from(&[b'a'; 400]), "a.bin", "application/octet-stream", 400)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let b = gateway
        .upload(body_from(&[b'b'; 400]), "b.bin", "application/octet-stream", 400)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    // Hit A so B becomes the least recently used.
    let download = gateway.download(&a.key, false).await.unwrap();
    collect(download.stream).await;
    tokio::time::sleep(Duration::from_millis(5)).await;

    gateway
        .upload(body_from(&[b'c'; 400]), "c.bin", "application/octet-stream", 400)
        .await
        .unwrap();

    assert!(gateway.is_cached(&a.key).await);
    assert!(!gateway.is_cached(&b.key).await);

    harness.service.shutdown().await;
}

// =============================================================================
// Invalidation
// =============================================================================

#[tokio::test]
async fn invalidation_then_read_through_recovery() {
    let harness = start_harness(1024 * 1024).await;
    let gateway = harness.service.gateway();

    let receipt = gateway
        .upload(body_from(b"version one"), "doc.txt", "text/plain", 11)
        .await
        .unwrap();

    // The object is overwritten out of band; a notification follows.
    harness
        .durable
        .insert(&receipt.key, "text/plain", &b"version two"[..]);
    harness.feed.push(FeedMessage::new(
        "m-1",
        vec![ChangeEvent::Object {
            key: receipt.key.clone(),
            kind: ChangeKind::Created,
        }],
    ));

    let g = gateway.clone();
    let key = receipt.key.clone();
    wait_for(move || {
        let g = g.clone();
        let key = key.clone();
        async move { !g.is_cached(&key).await }
    })
    .await;

    // The next read misses and picks up the new version.
    let download = gateway.download(&receipt.key, false).await.unwrap();
    assert_eq!(download.outcome, CacheOutcome::Miss);
    assert_eq!(collect(download.stream).await, b"version two");

    harness.service.shutdown().await;
}

#[tokio::test]
async fn invalidation_for_unknown_key_is_acknowledged() {
    let harness = start_harness(1024 * 1024).await;

    harness.feed.push(FeedMessage::new(
        "m-1",
        vec![ChangeEvent::Object {
            key: "never-seen".to_string(),
            kind: ChangeKind::Removed,
        }],
    ));

    let feed = Arc::clone(&harness.feed);
    wait_for(move || {
        let feed = Arc::clone(&feed);
        async move { feed.queued() == 0 && feed.in_flight() == 0 }
    })
    .await;

    harness.service.shutdown().await;
}

// =============================================================================
// Restart behavior
// =============================================================================

#[tokio::test]
async fn restart_rebuilds_index_with_mtime_order() {
    let cache_dir = TempDir::new().unwrap();
    let durable = Arc::new(MemoryStore::new());

    let config = || {
        GatewayConfig::new()
            .with_capacity_bytes(1000)
            .with_cache_dir(cache_dir.path().to_path_buf())
            .with_poll(FeedPollConfig {
                max_batch: 10,
                max_wait: Duration::from_millis(20),
            })
    };

    let service = GatewayService::start(
        config(),
        Arc::clone(&durable) as _,
        Arc::new(MemoryMetadataStore::new()) as _,
        Arc::new(MemoryFeed::new()) as _,
    )
    .await
    .unwrap();
    let gateway = service.gateway();
    let old = gateway
        .upload(body_from(&[b'o'; 400]), "old.bin", "application/octet-stream", 400)
        .await
        .unwrap();
    let new = gateway
        .upload(body_from(&[b'n'; 400]), "new.bin", "application/octet-stream", 400)
        .await
        .unwrap();
    service.shutdown().await;

    // Age the first entry's file so the rebuilt index sees it as older.
    let mut aged = None;
    for entry in std::fs::read_dir(cache_dir.path()).unwrap() {
        let entry = entry.unwrap();
        if entry.file_name().to_string_lossy().contains("old.bin") {
            aged = Some(entry.path());
        }
    }
    let aged = aged.expect("cached file for old.bin not found");
    let past = filetime::FileTime::from_unix_time(1_600_000_000, 0);
    filetime::set_file_mtime(&aged, past).unwrap();

    // Restart, then admit an object that forces one eviction.
    let service = GatewayService::start(
        config(),
        Arc::clone(&durable) as _,
        Arc::new(MemoryMetadataStore::new()) as _,
        Arc::new(MemoryFeed::new()) as _,
    )
    .await
    .unwrap();
    let gateway = service.gateway();
    assert_eq!(gateway.entry_count(), 2);

    gateway
        .upload(body_from(&[b'x'; 400]), "x.bin", "application/octet-stream", 400)
        .await
        .unwrap();

    assert!(!gateway.is_cached(&old.key).await);
    assert!(gateway.is_cached(&new.key).await);

    service.shutdown().await;
}
