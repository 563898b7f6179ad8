//! Process-wide connection configuration state.

use crate::core::snapshot::ConfigSnapshot;
use arc_swap::{ArcSwap, ArcSwapOption};
use config::Value;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};

static GLOBAL: LazyLock<Arc<GlobalConfig>> = LazyLock::new(|| Arc::new(GlobalConfig::new()));

/// The process-wide configuration state.
///
/// Unrelated parts of the host process read the current snapshot and the
/// defaults store from here.
pub fn global() -> Arc<GlobalConfig> {
    Arc::clone(&GLOBAL)
}

/// Current configuration slot plus a defaults store.
///
/// Reads are lock-free (`arc-swap`). Writes go through a single writer lock
/// so two publishes can never interleave their slot and defaults updates.
/// There is no versioned history: the last publish wins.
///
/// # Examples
///
/// ```rust
/// use hotswap_connections::core::{ConfigSnapshot, Connection, GlobalConfig};
/// use std::sync::Arc;
///
/// let global = GlobalConfig::new();
/// assert!(global.current().is_none());
///
/// let snapshot = ConfigSnapshot::new(vec![Connection::new("aws", "aws")])
///     .with_setting("options.database.port", 9193i64);
/// global.publish(Arc::new(snapshot));
///
/// assert_eq!(global.current().unwrap().connections.len(), 1);
/// assert!(global.default_value("options.database.port").is_some());
/// ```
pub struct GlobalConfig {
    current: ArcSwapOption<ConfigSnapshot>,
    defaults: ArcSwap<HashMap<String, Value>>,
    writer: Mutex<()>,
    generation: AtomicU64,
}

impl GlobalConfig {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            current: ArcSwapOption::empty(),
            defaults: ArcSwap::from_pointee(HashMap::new()),
            writer: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// Overwrite the current snapshot and merge its settings into the defaults.
    ///
    /// Existing default keys that the snapshot does not mention are kept;
    /// keys it does mention are overwritten. Returns the new generation.
    pub fn publish(&self, snapshot: Arc<ConfigSnapshot>) -> u64 {
        let _guard = self.writer.lock();

        let mut defaults = HashMap::clone(&self.defaults.load());
        defaults.extend(snapshot.config_map());

        self.current.store(Some(snapshot));
        self.defaults.store(Arc::new(defaults));

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(generation, "published connection config");
        generation
    }

    /// The most recently published snapshot, if any.
    pub fn current(&self) -> Option<Arc<ConfigSnapshot>> {
        self.current.load_full()
    }

    /// All defaults currently installed.
    pub fn defaults(&self) -> Arc<HashMap<String, Value>> {
        self.defaults.load_full()
    }

    /// Look up a single default.
    pub fn default_value(&self, key: &str) -> Option<Value> {
        self.defaults.load().get(key).cloned()
    }

    /// Number of publishes so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for GlobalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalConfig")
            .field("generation", &self.generation())
            .field("has_current", &self.current.load().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::snapshot::Connection;
    use std::thread;

    #[test]
    fn test_publish_replaces_current() {
        let global = GlobalConfig::new();
        assert_eq!(global.generation(), 0);

        global.publish(Arc::new(ConfigSnapshot::new(vec![Connection::new("a", "a")])));
        global.publish(Arc::new(ConfigSnapshot::new(vec![Connection::new("b", "b")])));

        let current = global.current().unwrap();
        assert_eq!(current.connection_names(), vec!["b"]);
        assert_eq!(global.generation(), 2);
    }

    #[test]
    fn test_defaults_merge() {
        let global = GlobalConfig::new();
        global.publish(Arc::new(
            ConfigSnapshot::default()
                .with_setting("options.database.port", 9193i64)
                .with_setting("options.general.telemetry", "info"),
        ));
        global.publish(Arc::new(
            ConfigSnapshot::default().with_setting("options.database.port", 9200i64),
        ));

        assert_eq!(
            global
                .default_value("options.database.port")
                .unwrap()
                .into_int()
                .unwrap(),
            9200
        );
        assert!(global.default_value("options.general.telemetry").is_some());
        assert_eq!(global.defaults().len(), 2);
    }

    #[test]
    fn test_concurrent_publishes_are_serialized() {
        let global = Arc::new(GlobalConfig::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let global = Arc::clone(&global);
                thread::spawn(move || {
                    for _ in 0..50 {
                        global.publish(Arc::new(
                            ConfigSnapshot::default().with_setting("writer", i as i64),
                        ));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(global.generation(), 400);
        // Slot and defaults come from the same publish.
        let last = global.current().unwrap().settings["writer"].clone();
        assert_eq!(global.default_value("writer"), Some(last));
    }

    #[test]
    fn test_global_is_shared() {
        assert!(Arc::ptr_eq(&global(), &global()));
    }
}
