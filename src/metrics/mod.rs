//! Built-in metrics for reload attempts.
//!
//! Provides OpenTelemetry metrics tracking:
//! - Reload attempts/success/failures (failures labelled by stage)
//! - Reload duration
//! - Suppressed startup batches
//! - Refresh warnings
//! - Configuration age
//!
//! # Examples
//!
//! ```rust,no_run
//! use hotswap_connections::prelude::*;
//! use hotswap_connections::metrics::ReloadMetrics;
//! use opentelemetry::global;
//!
//! # async fn example(clients: std::sync::Arc<dyn ClientFactory>) -> Result<()> {
//! let watcher = ConnectionWatcher::builder()
//!     .with_client_factory(clients)
//!     .with_metrics(ReloadMetrics::new(global::meter("my-app")))
//!     .build(|_map| {})?;
//! # Ok(())
//! # }
//! ```

mod reload_metrics;

pub use reload_metrics::ReloadMetrics;
