//! The public handle: watch the configuration directory and reload on change.

use crate::core::{ConfigLoader, ConfigSnapshot, DirectoryLoader, GlobalConfig, global};
use crate::error::{ReloadError, Result, ValidationError};
use crate::notify::{DEFAULT_DEBOUNCE, Inclusion, WatchOptions, WatchSubscription};
use crate::paths::{CONFIG_EXTENSION, ensure_config_dir};
use crate::reload::client::ClientFactory;
use crate::reload::orchestrator::{ReloadOrchestrator, ReloadPolicy};
use crate::reload::translate::ConnectionConfigMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "metrics")]
use crate::metrics::ReloadMetrics;

/// Watches the configuration directory and reloads connections on change.
///
/// Dropping the watcher closes it.
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_connections::prelude::*;
/// use std::sync::Arc;
///
/// # async fn example(clients: Arc<dyn ClientFactory>) -> Result<()> {
/// let watcher = ConnectionWatcher::new(
///     |map| println!("now serving {} connections", map.len()),
///     clients,
/// )?;
///
/// // ... run the application ...
///
/// watcher.close();
/// # Ok(())
/// # }
/// ```
pub struct ConnectionWatcher {
    subscription: WatchSubscription,
    orchestrator: ReloadOrchestrator,
}

impl ConnectionWatcher {
    /// Create a builder for configuring the watcher.
    pub fn builder() -> ConnectionWatcherBuilder {
        ConnectionWatcherBuilder::new()
    }

    /// Watch the default configuration directory with default settings.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration directory cannot be resolved or
    /// watched.
    pub fn new<F>(listener: F, clients: Arc<dyn ClientFactory>) -> Result<Self>
    where
        F: Fn(ConnectionConfigMap) + Send + Sync + 'static,
    {
        Self::builder().with_client_factory(clients).build(listener)
    }

    /// Stop watching. An attempt already in progress finishes; no listener
    /// call happens for later changes.
    pub fn close(&self) {
        self.subscription.close();
    }

    /// The underlying subscription.
    pub fn subscription(&self) -> &WatchSubscription {
        &self.subscription
    }

    /// The orchestrator handling change batches.
    pub fn orchestrator(&self) -> &ReloadOrchestrator {
        &self.orchestrator
    }
}

/// Builder for constructing a [`ConnectionWatcher`].
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_connections::prelude::*;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example(clients: Arc<dyn ClientFactory>) -> Result<()> {
/// let watcher = ConnectionWatcher::builder()
///     .with_config_dir("/etc/myapp/config")
///     .with_extension("yaml")
///     .with_debounce(Duration::from_millis(500))
///     .with_reload_timeout(Some(Duration::from_secs(30)))
///     .with_client_factory(clients)
///     .build(|map| println!("{} connections", map.len()))?;
/// # Ok(())
/// # }
/// ```
pub struct ConnectionWatcherBuilder {
    config_dir: Option<PathBuf>,
    extensions: Vec<String>,
    recursive: bool,
    debounce: Duration,
    loader: Option<Arc<dyn ConfigLoader>>,
    clients: Option<Arc<dyn ClientFactory>>,
    global: Option<Arc<GlobalConfig>>,
    policy: ReloadPolicy,
}

impl ConnectionWatcherBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config_dir: None,
            extensions: Vec::new(),
            recursive: true,
            debounce: DEFAULT_DEBOUNCE,
            loader: None,
            clients: None,
            global: None,
            policy: ReloadPolicy::default(),
        }
    }

    /// Watch this directory instead of the resolved default.
    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = Some(dir.into());
        self
    }

    /// Add a watched file extension. Without any, only `.toml` files count.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extensions.push(extension.into());
        self
    }

    /// Whether subdirectories are watched and loaded (default: true).
    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Quiet period used to coalesce changes into one batch.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Use a custom loader instead of reading the watched directory.
    pub fn with_loader<L: ConfigLoader + 'static>(mut self, loader: L) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    /// Factory for the per-attempt downstream client. Required.
    pub fn with_client_factory(mut self, clients: Arc<dyn ClientFactory>) -> Self {
        self.clients = Some(clients);
        self
    }

    /// Publish to this store instead of the process-wide one.
    pub fn with_global_config(mut self, global: Arc<GlobalConfig>) -> Self {
        self.global = Some(global);
        self
    }

    /// Upper bound for one reload attempt; `None` disables it.
    pub fn with_reload_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.policy.reload_timeout = timeout;
        self
    }

    /// Add a validation function every loaded snapshot must pass.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use hotswap_connections::prelude::*;
    ///
    /// let builder = ConnectionWatcher::builder().with_validation(|snapshot| {
    ///     if snapshot.connections.is_empty() {
    ///         return Err(ValidationError::custom("no connections configured"));
    ///     }
    ///     Ok(())
    /// });
    /// ```
    pub fn with_validation<F>(mut self, validator: F) -> Self
    where
        F: Fn(&ConfigSnapshot) -> std::result::Result<(), ValidationError> + Send + Sync + 'static,
    {
        self.policy.validator = Some(Arc::new(validator));
        self
    }

    /// Record reload metrics.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: ReloadMetrics) -> Self {
        self.policy.metrics = Some(metrics);
        self
    }

    /// Build the watcher and start watching.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No client factory was given
    /// - The configuration directory cannot be resolved or created
    /// - The directory cannot be watched
    pub fn build<F>(self, listener: F) -> Result<ConnectionWatcher>
    where
        F: Fn(ConnectionConfigMap) + Send + Sync + 'static,
    {
        let clients = self
            .clients
            .ok_or(ReloadError::MissingComponent("client factory"))?;

        let config_dir = match self.config_dir {
            Some(dir) => dir,
            None => ensure_config_dir()?,
        };
        let extensions = if self.extensions.is_empty() {
            vec![CONFIG_EXTENSION.to_string()]
        } else {
            self.extensions
        };

        let loader = self.loader.unwrap_or_else(|| {
            Arc::new(
                DirectoryLoader::new(&config_dir)
                    .with_extensions(extensions.clone())
                    .with_recursive(self.recursive),
            )
        });

        let orchestrator = ReloadOrchestrator::new(
            loader,
            clients,
            self.global.unwrap_or_else(global),
            Arc::new(listener),
            self.policy,
        );

        let subscription = WatchSubscription::new(WatchOptions {
            directories: vec![config_dir],
            inclusion: Inclusion::from_extensions(&extensions),
            recursive: self.recursive,
            debounce: self.debounce,
            handler: Arc::new(orchestrator.clone()),
        })?;
        subscription.start()?;

        tracing::info!("created connection watcher");
        Ok(ConnectionWatcher {
            subscription,
            orchestrator,
        })
    }
}

impl Default for ConnectionWatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}
