//! Reloading connection configuration in response to change batches.

pub mod client;
pub mod connection_watcher;
pub mod orchestrator;
pub mod translate;

pub use client::{ClientFactory, DownstreamClient, RefreshResult};
pub use connection_watcher::{ConnectionWatcher, ConnectionWatcherBuilder};
pub use orchestrator::{
    ConnectionListener, DEFAULT_RELOAD_TIMEOUT, ReloadOrchestrator, ReloadOutcome, ReloadPolicy,
    SnapshotValidator,
};
pub use translate::{ConnectionConfig, ConnectionConfigMap, connection_config_map};
