//! CloudVault CLI - runs the caching gateway as a long-lived process.
//!
//! Wires the gateway against in-memory durable/metadata/feed backends (a
//! local mode useful for development and demos; real clients plug in
//! through the same traits) and runs until interrupted.

mod error;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use cloudvault::config::{FeedPollConfig, GatewayConfig};
use cloudvault::gateway::GatewayService;
use cloudvault::invalidate::MemoryFeed;
use cloudvault::logging::{self, DEFAULT_LOG_DIR, DEFAULT_LOG_FILE};
use cloudvault::store::{MemoryMetadataStore, MemoryStore};

use error::CliError;

#[derive(Parser)]
#[command(name = "cloudvault")]
#[command(version = cloudvault::VERSION)]
#[command(about = "Caching gateway for durable object storage", long_about = None)]
struct Args {
    /// Cache capacity in megabytes
    #[arg(long, env = "CLOUDVAULT_CAPACITY_MB", default_value = "100")]
    capacity_mb: u64,

    /// Cache directory (defaults to the platform cache dir)
    #[arg(long, env = "CLOUDVAULT_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Maximum notification messages per feed poll
    #[arg(long, env = "CLOUDVAULT_FEED_BATCH", default_value = "10")]
    feed_batch: usize,

    /// Feed long-poll wait in seconds
    #[arg(long, env = "CLOUDVAULT_FEED_WAIT_SECS", default_value = "20")]
    feed_wait_secs: u64,

    /// Log directory
    #[arg(long, default_value = DEFAULT_LOG_DIR)]
    log_dir: String,
}

fn build_config(args: &Args) -> Result<GatewayConfig, CliError> {
    if args.capacity_mb == 0 {
        return Err(CliError::Config(
            "capacity must be at least 1 MB".to_string(),
        ));
    }
    if args.feed_batch == 0 {
        return Err(CliError::Config(
            "feed batch size must be at least 1".to_string(),
        ));
    }

    let mut config = GatewayConfig::new()
        .with_capacity_bytes(args.capacity_mb * 1024 * 1024)
        .with_poll(FeedPollConfig {
            max_batch: args.feed_batch,
            max_wait: std::time::Duration::from_secs(args.feed_wait_secs),
        });
    if let Some(dir) = &args.cache_dir {
        config = config.with_cache_dir(dir.clone());
    }
    Ok(config)
}

async fn run(args: Args) -> Result<(), CliError> {
    let _guard = logging::init_logging(&args.log_dir, DEFAULT_LOG_FILE)
        .map_err(|e| CliError::LoggingInit(e.to_string()))?;

    let config = build_config(&args)?;
    info!(
        version = cloudvault::VERSION,
        capacity_mb = args.capacity_mb,
        cache_dir = %config.cache_dir.display(),
        "starting cloudvault"
    );

    let service = GatewayService::start(
        config,
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryMetadataStore::new()),
        Arc::new(MemoryFeed::new()),
    )
    .await
    .map_err(CliError::ServiceStart)?;

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| CliError::Config(format!("failed to listen for ctrl-c: {}", e)))?;

    info!("interrupt received, shutting down");
    service.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = run(args).await {
        e.exit();
    }
}
