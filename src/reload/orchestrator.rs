//! The reload state machine driven by change batches.

use crate::core::{ConfigLoader, ConfigSnapshot, GlobalConfig, Validate};
use crate::error::{ReloadError, Result, ValidationError};
use crate::notify::{ChangeBatch, ChangeHandler};
use crate::reload::client::{ClientFactory, ClientGuard, DownstreamClient};
use crate::reload::translate::{ConnectionConfigMap, connection_config_map};
use async_trait::async_trait;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

#[cfg(feature = "metrics")]
use crate::metrics::ReloadMetrics;

/// Default upper bound for one reload attempt.
pub const DEFAULT_RELOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Receives the translated connection map after every successful load.
pub type ConnectionListener = Arc<dyn Fn(ConnectionConfigMap) + Send + Sync>;

/// Extra validation run on each loaded snapshot.
pub type SnapshotValidator =
    Arc<dyn Fn(&ConfigSnapshot) -> std::result::Result<(), ValidationError> + Send + Sync>;

/// Optional knobs for a [`ReloadOrchestrator`].
#[derive(Clone)]
pub struct ReloadPolicy {
    /// Upper bound for steps load..refresh; `None` waits forever
    pub reload_timeout: Option<Duration>,
    /// Validation on top of the built-in [`Validate`] checks
    pub validator: Option<SnapshotValidator>,
    /// Metrics sink
    #[cfg(feature = "metrics")]
    pub metrics: Option<ReloadMetrics>,
}

impl Default for ReloadPolicy {
    fn default() -> Self {
        Self {
            reload_timeout: Some(DEFAULT_RELOAD_TIMEOUT),
            validator: None,
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }
}

/// What a handled batch amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// The startup batch; nothing was done.
    Suppressed,
    /// Config was loaded, published and refreshed.
    Reloaded {
        /// Number of connections handed to the listener
        connections: usize,
        /// Non-fatal refresh warnings
        warnings: Vec<String>,
    },
}

struct Inner {
    loader: Arc<dyn ConfigLoader>,
    clients: Arc<dyn ClientFactory>,
    global: Arc<GlobalConfig>,
    listener: ConnectionListener,
    policy: ReloadPolicy,
    past_first_event: AtomicBool,
    batches_seen: AtomicU64,
    reload_lock: tokio::sync::Mutex<()>,
}

/// Turns change batches into reload attempts.
///
/// The first batch ever handled is the watch's startup artifact and is
/// ignored. Every later batch triggers exactly one attempt:
///
/// 1. load the configuration from scratch and validate it
/// 2. create a downstream client (failure ends the attempt)
/// 3. hand the translated connection map to the listener
/// 4. publish the snapshot to the global store (never rolled back)
/// 5. refresh connections and search paths, then log any warnings
///
/// The client is released exactly once whichever step fails. Attempts are
/// serialized. Cloning is cheap and shares all state.
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_connections::prelude::*;
/// use hotswap_connections::core::{DirectoryLoader, global};
/// use hotswap_connections::notify::ChangeBatch;
/// use hotswap_connections::reload::{ConnectionConfigMap, ReloadOrchestrator, ReloadPolicy};
/// use std::sync::Arc;
///
/// # async fn example(clients: Arc<dyn ClientFactory>) {
/// let orchestrator = ReloadOrchestrator::new(
///     Arc::new(DirectoryLoader::new("/etc/myapp/config")),
///     clients,
///     global(),
///     Arc::new(|map: ConnectionConfigMap| println!("{} connections", map.len())),
///     ReloadPolicy::default(),
/// );
///
/// // First batch is ignored, the second reloads.
/// orchestrator.on_events(ChangeBatch::initial()).await;
/// orchestrator.on_events(ChangeBatch::default()).await;
/// # }
/// ```
#[derive(Clone)]
pub struct ReloadOrchestrator {
    inner: Arc<Inner>,
}

impl ReloadOrchestrator {
    /// Create an orchestrator that has not seen any batch yet.
    pub fn new(
        loader: Arc<dyn ConfigLoader>,
        clients: Arc<dyn ClientFactory>,
        global: Arc<GlobalConfig>,
        listener: ConnectionListener,
        policy: ReloadPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                loader,
                clients,
                global,
                listener,
                policy,
                past_first_event: AtomicBool::new(false),
                batches_seen: AtomicU64::new(0),
                reload_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Handle a batch without letting anything escape.
    ///
    /// Errors are logged; a panic anywhere in the attempt is caught at the
    /// task boundary and logged. The orchestrator stays ready for the next
    /// batch either way.
    pub async fn on_events(&self, batch: ChangeBatch) {
        let this = self.clone();
        let task = tokio::spawn(async move { this.handle_batch(batch).await });

        match task.await {
            Ok(Ok(ReloadOutcome::Suppressed)) => {}
            Ok(Ok(ReloadOutcome::Reloaded {
                connections,
                warnings,
            })) => {
                tracing::info!(
                    connections,
                    warnings = warnings.len(),
                    "reloaded connection config"
                );
            }
            Ok(Err(e)) => {
                tracing::warn!(stage = e.stage(), "failed to reload connection config: {}", e);
            }
            Err(e) if e.is_panic() => {
                tracing::warn!(
                    "connection reload caught a panic: {}",
                    panic_message(e.into_panic().as_ref())
                );
            }
            Err(e) => {
                tracing::warn!("connection reload task was cancelled: {}", e);
            }
        }
    }

    /// Handle a batch and report what happened.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing step. Steps before it keep
    /// their effects; in particular a refresh failure leaves the new snapshot
    /// published.
    pub async fn handle_batch(&self, batch: ChangeBatch) -> Result<ReloadOutcome> {
        let _reloading = self.inner.reload_lock.lock().await;
        let seen = self.inner.batches_seen.fetch_add(1, Ordering::SeqCst) + 1;

        if !self.inner.past_first_event.swap(true, Ordering::SeqCst) {
            tracing::trace!("ignoring first change batch");
            #[cfg(feature = "metrics")]
            if let Some(metrics) = &self.inner.policy.metrics {
                metrics.record_suppressed();
            }
            return Ok(ReloadOutcome::Suppressed);
        }

        tracing::debug!(
            batch = seen,
            events = batch.len(),
            paths = ?batch.paths(),
            "connection config changed"
        );

        #[cfg(feature = "metrics")]
        let timer = self.inner.policy.metrics.as_ref().map(|m| m.start_reload());

        let result = match self.inner.policy.reload_timeout {
            Some(limit) => tokio::time::timeout(limit, self.attempt())
                .await
                .unwrap_or(Err(ReloadError::TimedOut(limit))),
            None => self.attempt().await,
        };

        #[cfg(feature = "metrics")]
        if let (Some(metrics), Some(timer)) = (&self.inner.policy.metrics, timer) {
            match &result {
                Ok(ReloadOutcome::Reloaded { warnings, .. }) => {
                    metrics.record_reload_success(timer, warnings.len())
                }
                Ok(ReloadOutcome::Suppressed) => {}
                Err(e) => metrics.record_reload_failure(timer, e.stage()),
            }
        }

        result
    }

    async fn attempt(&self) -> Result<ReloadOutcome> {
        let snapshot = Arc::new(self.load().await?);
        tracing::trace!(connections = snapshot.connections.len(), "loaded updated config");

        let client = self.inner.clients.create().await.map_err(|e| match e {
            ReloadError::ClientCreation(_) => e,
            other => ReloadError::ClientCreation(other.to_string()),
        })?;

        let guard = ClientGuard::new(client);
        let result = self.apply(snapshot, guard.client()).await;
        guard.release().await;
        result
    }

    async fn load(&self) -> Result<ConfigSnapshot> {
        let loader = Arc::clone(&self.inner.loader);
        let snapshot = tokio::task::spawn_blocking(move || loader.load())
            .await
            .map_err(|e| {
                if e.is_panic() {
                    ReloadError::LoadError(format!(
                        "loader panicked: {}",
                        panic_message(e.into_panic().as_ref())
                    ))
                } else {
                    ReloadError::LoadError(format!("loader task failed: {}", e))
                }
            })??;

        snapshot.validate()?;
        if let Some(validator) = &self.inner.policy.validator {
            validator(&snapshot)?;
        }
        Ok(snapshot)
    }

    async fn apply(
        &self,
        snapshot: Arc<ConfigSnapshot>,
        client: &dyn DownstreamClient,
    ) -> Result<ReloadOutcome> {
        let config_map = connection_config_map(&snapshot);
        let connections = config_map.len();

        tracing::trace!("calling connection listener");
        let listener = &self.inner.listener;
        std::panic::catch_unwind(AssertUnwindSafe(|| listener(config_map)))
            .map_err(|payload| ReloadError::ListenerPanicked(panic_message(payload.as_ref())))?;

        // Refresh reads the published config, so publish first.
        self.inner.global.publish(Arc::clone(&snapshot));

        tracing::trace!("refreshing connections and search paths");
        let refresh = client
            .refresh_connections_and_search_paths()
            .await
            .map_err(|e| match e {
                ReloadError::Refresh(_) => e,
                other => ReloadError::Refresh(other.to_string()),
            })?;

        refresh.show_warnings();
        Ok(ReloadOutcome::Reloaded {
            connections,
            warnings: refresh.warnings,
        })
    }

    /// Whether the startup batch has been seen.
    pub fn past_first_event(&self) -> bool {
        self.inner.past_first_event.load(Ordering::SeqCst)
    }

    /// Number of batches handled so far, including the suppressed one.
    pub fn batches_seen(&self) -> u64 {
        self.inner.batches_seen.load(Ordering::SeqCst)
    }

    /// The global store this orchestrator publishes to.
    pub fn global(&self) -> &Arc<GlobalConfig> {
        &self.inner.global
    }
}

#[async_trait]
impl ChangeHandler for ReloadOrchestrator {
    async fn on_change(&self, batch: ChangeBatch) {
        self.on_events(batch).await;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
