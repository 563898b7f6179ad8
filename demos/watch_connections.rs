//! Watch a configuration directory and print every reload.
//!
//! This demo shows how to:
//! - Plug in a downstream client factory
//! - Receive the connection map after each change
//! - Read the published snapshot from the global store
//!
//! Run with: RUST_LOG=hotswap_connections=debug cargo run --example watch_connections -- /tmp/hotswap-demo
//!
//! While running, add or edit `.toml` files in that directory, e.g.
//!
//! ```toml
//! [connection.aws]
//! plugin = "hub.example.com/plugins/acme/aws@latest"
//! regions = ["us-east-1"]
//! ```

use async_trait::async_trait;
use hotswap_connections::core::global;
use hotswap_connections::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing_subscriber::EnvFilter;

struct LoggingClient {
    id: usize,
}

#[async_trait]
impl DownstreamClient for LoggingClient {
    async fn refresh_connections_and_search_paths(&self) -> Result<RefreshResult> {
        let snapshot = global().current();
        let names = snapshot
            .as_ref()
            .map(|s| s.connection_names().join(", "))
            .unwrap_or_default();
        println!("[client {}] refreshing connections: {}", self.id, names);

        let mut result = RefreshResult::ok();
        if names.is_empty() {
            result = result.with_warning("no connections configured");
        }
        Ok(result)
    }

    async fn close(&self) -> Result<()> {
        println!("[client {}] closed", self.id);
        Ok(())
    }
}

#[derive(Default)]
struct LoggingFactory {
    created: AtomicUsize,
}

#[async_trait]
impl ClientFactory for LoggingFactory {
    async fn create(&self) -> Result<Box<dyn DownstreamClient>> {
        let id = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Box::new(LoggingClient { id }))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("=== Connection Watch Demo ===\n");

    let mut builder = ConnectionWatcher::builder()
        .with_extension("toml")
        .with_extension("yaml")
        .with_client_factory(Arc::new(LoggingFactory::default()));

    let dir = std::env::args().nth(1).map(PathBuf::from);
    if let Some(dir) = &dir {
        std::fs::create_dir_all(dir)?;
        builder = builder.with_config_dir(dir);
    }

    let watcher = builder.build(|map| {
        let mut names: Vec<_> = map.keys().cloned().collect();
        names.sort();
        println!("listener: {} connection(s): {:?}", map.len(), names);
        for name in &names {
            let conn = &map[name];
            println!(
                "  {} -> {} ({}, {} option(s))",
                conn.connection,
                conn.plugin_short_name,
                conn.kind,
                conn.config.len()
            );
        }
    })?;

    let watched: Vec<_> = watcher.subscription().directories().to_vec();
    println!("Watching {:?}", watched);
    println!("Edit files there to trigger a reload. Press Ctrl+C to exit.\n");

    tokio::signal::ctrl_c().await?;

    println!("\nShutting down...");
    watcher.close();
    println!(
        "Handled {} change batch(es)",
        watcher.orchestrator().batches_seen()
    );
    Ok(())
}
