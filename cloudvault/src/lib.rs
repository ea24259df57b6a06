//! CloudVault - write-through caching gateway for durable object storage
//!
//! Objects uploaded through the gateway are committed to a durable store
//! and cached on local disk in one streaming pass; downloads are served
//! from the cache when possible and replenish it when not. The cache
//! holds a strict byte budget with least-recently-used eviction, and a
//! notification feed keeps it coherent with out-of-band durable-store
//! changes.
//!
//! # High-Level API
//!
//! The [`gateway`] module provides the service facade:
//!
//! ```ignore
//! use cloudvault::config::GatewayConfig;
//! use cloudvault::gateway::GatewayService;
//!
//! let config = GatewayConfig::default().with_capacity_bytes(100 * 1024 * 1024);
//! let service = GatewayService::start(config, durable, metadata, feed).await?;
//!
//! let receipt = service.gateway().upload(body, "report.pdf", "application/pdf", len).await?;
//! let download = service.gateway().download(&receipt.key, false).await?;
//! ```

pub mod cache;
pub mod config;
pub mod gateway;
pub mod invalidate;
pub mod logging;
pub mod store;

/// Version of the CloudVault library and CLI.
///
/// Synchronized across the workspace; injected from `Cargo.toml` at
/// compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
