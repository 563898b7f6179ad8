//! Directory watching that delivers batches of changes to a single handler.

use crate::error::{ReloadError, Result};
use crate::notify::batch::{ChangeBatch, Inclusion};
use async_trait::async_trait;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Default time to wait for more events before delivering a batch.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

/// A batch is delivered at the latest this many debounce windows after its
/// first event, even if changes keep arriving.
pub const MAX_BATCH_WINDOWS: u32 = 4;

/// Receives batches of filesystem changes.
///
/// Calls are never concurrent: the subscription awaits each call before
/// delivering the next batch.
#[async_trait]
pub trait ChangeHandler: Send + Sync {
    /// Handle one batch of changes.
    async fn on_change(&self, batch: ChangeBatch);
}

/// What to watch and who to tell.
pub struct WatchOptions {
    /// Directories to watch
    pub directories: Vec<PathBuf>,
    /// Which files are relevant
    pub inclusion: Inclusion,
    /// Whether subdirectories are watched too
    pub recursive: bool,
    /// Quiet period used to coalesce events into one batch; a batch never
    /// waits longer than [`MAX_BATCH_WINDOWS`] of these
    pub debounce: Duration,
    /// Receiver of change batches
    pub handler: Arc<dyn ChangeHandler>,
}

impl WatchOptions {
    /// Options for one directory with the default debounce, recursive.
    pub fn new(
        directory: impl Into<PathBuf>,
        inclusion: Inclusion,
        handler: Arc<dyn ChangeHandler>,
    ) -> Self {
        Self {
            directories: vec![directory.into()],
            inclusion,
            recursive: true,
            debounce: DEFAULT_DEBOUNCE,
            handler,
        }
    }
}

/// A directory watch that delivers [`ChangeBatch`]es to a [`ChangeHandler`].
///
/// Uses the `notify` crate for OS notifications. Raw events are filtered by
/// the inclusion predicate, coalesced for the debounce window and delivered
/// one batch at a time. Right after [`start`](Self::start) an empty batch is
/// delivered once, whether or not anything changed.
///
/// # Examples
///
/// ```rust,no_run
/// use async_trait::async_trait;
/// use hotswap_connections::notify::{ChangeBatch, ChangeHandler, Inclusion, WatchOptions, WatchSubscription};
/// use std::sync::Arc;
///
/// struct Printer;
///
/// #[async_trait]
/// impl ChangeHandler for Printer {
///     async fn on_change(&self, batch: ChangeBatch) {
///         println!("{} paths changed", batch.paths().len());
///     }
/// }
///
/// # async fn example() -> hotswap_connections::error::Result<()> {
/// let options = WatchOptions::new("/etc/myapp/config", Inclusion::from_extensions(["toml"]), Arc::new(Printer));
/// let subscription = WatchSubscription::new(options)?;
/// subscription.start()?;
/// // ...
/// subscription.close();
/// # Ok(())
/// # }
/// ```
pub struct WatchSubscription {
    directories: Vec<PathBuf>,
    inclusion: Inclusion,
    recursive: bool,
    debounce: Duration,
    handler: Arc<dyn ChangeHandler>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<Event>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
    // Held while a batch is handed off, so close() and a handoff never interleave.
    closed: Arc<Mutex<bool>>,
}

impl WatchSubscription {
    /// Create the watch and register every directory with the OS.
    ///
    /// Nothing is delivered until [`start`](Self::start) is called.
    ///
    /// # Errors
    ///
    /// Returns an error if no directory is given, a directory cannot be
    /// resolved, or the underlying watcher cannot be created or registered.
    pub fn new(options: WatchOptions) -> Result<Self> {
        if options.directories.is_empty() {
            return Err(ReloadError::WatchError(
                "No directories to watch".to_string(),
            ));
        }

        let directories = options
            .directories
            .iter()
            .map(|dir| {
                dir.canonicalize().map_err(|e| {
                    ReloadError::WatchError(format!(
                        "Failed to resolve directory {}: {}",
                        dir.display(),
                        e
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        // Channel for raw events from notify
        let (event_tx, event_rx) = mpsc::unbounded_channel::<Event>();
        let inclusion = options.inclusion.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) if inclusion.accepts(&event) => {
                    let _ = event_tx.send(event);
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("file watch error: {}", e),
            }
        })
        .map_err(|e| ReloadError::WatchError(format!("Failed to create file watcher: {}", e)))?;

        let mode = if options.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        for dir in &directories {
            watcher.watch(dir, mode).map_err(|e| {
                ReloadError::WatchError(format!("Failed to watch {}: {}", dir.display(), e))
            })?;
        }

        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            directories,
            inclusion: options.inclusion,
            recursive: options.recursive,
            debounce: options.debounce,
            handler: options.handler,
            watcher: Mutex::new(Some(watcher)),
            event_rx: Mutex::new(Some(event_rx)),
            task: Mutex::new(None),
            shutdown,
            closed: Arc::new(Mutex::new(false)),
        })
    }

    /// Begin delivering batches.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription was already started or closed.
    pub fn start(&self) -> Result<()> {
        if *self.closed.lock() {
            return Err(ReloadError::WatchError(
                "Subscription is closed".to_string(),
            ));
        }
        let event_rx = self.event_rx.lock().take().ok_or_else(|| {
            ReloadError::WatchError("Subscription already started".to_string())
        })?;

        let delivery = Delivery {
            handler: Arc::clone(&self.handler),
            debounce: self.debounce,
            closed: Arc::clone(&self.closed),
            shutdown: self.shutdown.subscribe(),
        };
        *self.task.lock() = Some(tokio::spawn(delivery.run(event_rx)));

        tracing::info!(
            directories = ?self.directories,
            extensions = ?self.inclusion.extensions(),
            recursive = self.recursive,
            "started watching"
        );
        Ok(())
    }

    /// Stop delivery and release OS resources.
    ///
    /// A batch already being handled runs to completion; nothing is delivered
    /// after this returns. Calling it again does nothing.
    pub fn close(&self) {
        {
            let mut closed = self.closed.lock();
            if *closed {
                return;
            }
            *closed = true;
        }
        let _ = self.shutdown.send(true);
        drop(self.watcher.lock().take());
        drop(self.event_rx.lock().take());
        // Detach; the delivery task exits on its own after any in-flight batch.
        drop(self.task.lock().take());
        tracing::info!(directories = ?self.directories, "stopped watching");
    }

    /// Whether batches are being delivered.
    pub fn is_running(&self) -> bool {
        !*self.closed.lock() && self.task.lock().is_some()
    }

    /// Canonicalized watched directories.
    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    /// The inclusion predicate.
    pub fn inclusion(&self) -> &Inclusion {
        &self.inclusion
    }

    /// Get the debounce duration for this subscription.
    pub fn debounce_duration(&self) -> Duration {
        self.debounce
    }
}

impl Drop for WatchSubscription {
    fn drop(&mut self) {
        self.close();
    }
}

/// State owned by the delivery task.
struct Delivery {
    handler: Arc<dyn ChangeHandler>,
    debounce: Duration,
    closed: Arc<Mutex<bool>>,
    shutdown: watch::Receiver<bool>,
}

impl Delivery {
    async fn run(mut self, mut event_rx: mpsc::UnboundedReceiver<Event>) {
        // Startup artifact: one empty batch, always.
        if !self.deliver(ChangeBatch::initial()).await {
            return;
        }

        loop {
            let first = tokio::select! {
                biased;
                _ = self.shutdown.changed() => break,
                event = event_rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            let mut batch = ChangeBatch::new(vec![first]);
            let deadline = Instant::now() + self.debounce * MAX_BATCH_WINDOWS;

            // Keep collecting until the directory has been quiet for `debounce`
            // or the batch reaches its deadline.
            loop {
                let quiet_until = (Instant::now() + self.debounce).min(deadline);
                tokio::select! {
                    biased;
                    _ = self.shutdown.changed() => return,
                    event = tokio::time::timeout_at(quiet_until, event_rx.recv()) => match event {
                        Ok(Some(event)) => batch.push(event),
                        Ok(None) | Err(_) => break,
                    },
                }
                if Instant::now() >= deadline {
                    break;
                }
            }

            if !self.deliver(batch).await {
                break;
            }

            // Changes that piled up while the handler ran are superseded by
            // the next full reload; fold them into a single batch.
            let mut pending = ChangeBatch::default();
            while let Ok(event) = event_rx.try_recv() {
                pending.push(event);
            }
            if !pending.is_empty() && !self.deliver(pending).await {
                break;
            }
        }

        tracing::debug!("delivery task stopped");
    }

    /// Hand a batch to the handler unless the subscription was closed, then
    /// wait for the handler to finish.
    ///
    /// The handler call is spawned while the close lock is held: once
    /// `close()` has returned, no further batch is handed off.
    async fn deliver(&self, batch: ChangeBatch) -> bool {
        let handoff = {
            let closed = self.closed.lock();
            if *closed {
                return false;
            }
            tracing::trace!(events = batch.len(), "delivering change batch");
            let handler = Arc::clone(&self.handler);
            tokio::spawn(async move { handler.on_change(batch).await })
        };

        if let Err(e) = handoff.await {
            tracing::warn!("change handler failed: {}", e);
        }
        true
    }
}
