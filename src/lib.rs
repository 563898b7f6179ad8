//! # hotswap-connections
//!
//! Hot-reload connection configuration from a watched directory, without
//! restarting the process.
//!
//! ## Overview
//!
//! `hotswap-connections` watches a configuration directory and, whenever a
//! relevant file changes:
//! - reloads the whole configuration from scratch and validates it
//! - hands a translated connection map to a registered listener
//! - publishes the snapshot to process-wide state (lock-free reads via `arc-swap`)
//! - refreshes downstream connections and search paths through a short-lived client
//!
//! Every failure on that path is logged and absorbed; the host process never
//! sees it and the watcher stays ready for the next change.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use hotswap_connections::prelude::*;
//! use std::sync::Arc;
//!
//! struct Db;
//!
//! #[async_trait]
//! impl DownstreamClient for Db {
//!     async fn refresh_connections_and_search_paths(&self) -> Result<RefreshResult> {
//!         Ok(RefreshResult::ok())
//!     }
//!
//!     async fn close(&self) -> Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! struct DbFactory;
//!
//! #[async_trait]
//! impl ClientFactory for DbFactory {
//!     async fn create(&self) -> Result<Box<dyn DownstreamClient>> {
//!         Ok(Box::new(Db))
//!     }
//! }
//!
//! # async fn example() -> Result<()> {
//! let watcher = ConnectionWatcher::builder()
//!     .with_config_dir("config")
//!     .with_client_factory(Arc::new(DbFactory))
//!     .build(|map| println!("{} connections", map.len()))?;
//!
//! // ... later, on shutdown
//! watcher.close();
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `metrics`: OpenTelemetry reload metrics

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

pub mod core;
pub mod error;
pub mod notify;
pub mod paths;
pub mod reload;

#[cfg(feature = "metrics")]
pub mod metrics;

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::core::{ConfigSnapshot, Connection, GlobalConfig, Validate};
    pub use crate::error::{ReloadError, Result, ValidationError};
    pub use crate::reload::{
        ClientFactory, ConnectionConfig, ConnectionConfigMap, ConnectionWatcher,
        ConnectionWatcherBuilder, DownstreamClient, RefreshResult,
    };
}
