//! The short-lived downstream client used once per reload attempt.

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Outcome of a successful refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshResult {
    /// Non-fatal problems worth telling the user about
    pub warnings: Vec<String>,
}

impl RefreshResult {
    /// A refresh with no warnings.
    pub fn ok() -> Self {
        Self::default()
    }

    /// Add a warning.
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    /// Log every warning.
    pub fn show_warnings(&self) {
        for warning in &self.warnings {
            tracing::warn!("{}", warning);
        }
    }
}

/// A client that knows how to re-derive connections and search paths from
/// the freshly published configuration.
#[async_trait]
pub trait DownstreamClient: Send + Sync {
    /// Refresh connections and search paths.
    ///
    /// # Errors
    ///
    /// Returns an error if the refresh failed; warnings go in the result.
    async fn refresh_connections_and_search_paths(&self) -> Result<RefreshResult>;

    /// Release the client.
    ///
    /// # Errors
    ///
    /// Returns an error if releasing failed. The client is not used again
    /// either way.
    async fn close(&self) -> Result<()>;
}

/// Creates a fresh [`DownstreamClient`] for each reload attempt.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// Create a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be created; the attempt is
    /// abandoned.
    async fn create(&self) -> Result<Box<dyn DownstreamClient>>;
}

/// Owns a client for the length of one attempt and releases it exactly once.
///
/// Call [`release`](Self::release) on every normal exit. If the guard is
/// dropped without that (the attempt timed out or panicked), the release is
/// spawned onto the current runtime instead.
pub(crate) struct ClientGuard {
    client: Arc<dyn DownstreamClient>,
    released: bool,
}

impl ClientGuard {
    pub(crate) fn new(client: Box<dyn DownstreamClient>) -> Self {
        Self {
            client: Arc::from(client),
            released: false,
        }
    }

    pub(crate) fn client(&self) -> &dyn DownstreamClient {
        self.client.as_ref()
    }

    /// Close the client and wait for it.
    ///
    /// The close runs as its own task, so cancelling the caller (e.g. on
    /// timeout) cannot cut it short or make it run twice.
    pub(crate) async fn release(mut self) {
        self.released = true;
        let close = tokio::spawn(close_client(Arc::clone(&self.client)));
        if let Err(e) = close.await {
            tracing::warn!("client close task failed: {}", e);
        }
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(close_client(Arc::clone(&self.client)));
            }
            Err(_) => tracing::warn!("no runtime to release client on; dropping it"),
        }
    }
}

async fn close_client(client: Arc<dyn DownstreamClient>) {
    if let Err(e) = client.close().await {
        tracing::warn!("error closing client: {}", e);
    }
}
