//! Reload metrics tracking using OpenTelemetry.

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use std::sync::Arc;
use std::time::Instant;

/// Metrics collector for reload attempts.
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_connections::metrics::ReloadMetrics;
/// use opentelemetry::global;
///
/// let metrics = ReloadMetrics::new(global::meter("hotswap-connections"));
///
/// let timer = metrics.start_reload();
/// // ... perform reload ...
/// metrics.record_reload_success(timer, 0);
/// ```
#[derive(Clone)]
pub struct ReloadMetrics {
    reload_attempts: Counter<u64>,
    reload_success: Counter<u64>,
    reload_failures: Counter<u64>,
    reload_duration: Histogram<f64>,
    suppressed_batches: Counter<u64>,
    refresh_warnings: Counter<u64>,
    config_age_seconds: Gauge<i64>,
    last_update: Arc<parking_lot::Mutex<Instant>>,
}

impl ReloadMetrics {
    /// Create a new metrics collector with the provided meter.
    pub fn new(meter: Meter) -> Self {
        let reload_attempts = meter
            .u64_counter("hotswap_connections.reload.attempts")
            .with_description("Total number of reload attempts")
            .build();

        let reload_success = meter
            .u64_counter("hotswap_connections.reload.success")
            .with_description("Number of successful reloads")
            .build();

        let reload_failures = meter
            .u64_counter("hotswap_connections.reload.failures")
            .with_description("Number of failed reloads, by pipeline stage")
            .build();

        let reload_duration = meter
            .f64_histogram("hotswap_connections.reload.duration")
            .with_description("Duration of reload attempts in seconds")
            .with_unit("s")
            .build();

        let suppressed_batches = meter
            .u64_counter("hotswap_connections.batches.suppressed")
            .with_description("Change batches ignored as startup artifacts")
            .build();

        let refresh_warnings = meter
            .u64_counter("hotswap_connections.refresh.warnings")
            .with_description("Non-fatal warnings returned by refreshes")
            .build();

        let config_age_seconds = meter
            .i64_gauge("hotswap_connections.age")
            .with_description("Time since the last successful reload in seconds")
            .with_unit("s")
            .build();

        Self {
            reload_attempts,
            reload_success,
            reload_failures,
            reload_duration,
            suppressed_batches,
            refresh_warnings,
            config_age_seconds,
            last_update: Arc::new(parking_lot::Mutex::new(Instant::now())),
        }
    }

    /// Start a reload timer and count the attempt.
    pub fn start_reload(&self) -> Instant {
        self.reload_attempts.add(1, &[]);
        Instant::now()
    }

    /// Record a successful reload and the warnings it produced.
    pub fn record_reload_success(&self, start: Instant, warnings: usize) {
        self.reload_success.add(1, &[]);
        self.reload_duration.record(start.elapsed().as_secs_f64(), &[]);
        if warnings > 0 {
            self.refresh_warnings.add(warnings as u64, &[]);
        }
        *self.last_update.lock() = Instant::now();
    }

    /// Record a failed reload.
    ///
    /// # Arguments
    ///
    /// * `start` - The `Instant` returned from `start_reload()`
    /// * `stage` - The pipeline stage that failed (see `ReloadError::stage`)
    pub fn record_reload_failure(&self, start: Instant, stage: &'static str) {
        self.reload_failures.add(1, &[KeyValue::new("stage", stage)]);
        self.reload_duration.record(start.elapsed().as_secs_f64(), &[]);
    }

    /// Record a batch ignored as the startup artifact.
    pub fn record_suppressed(&self) {
        self.suppressed_batches.add(1, &[]);
    }

    /// Update the configuration age metric.
    ///
    /// This should be called periodically to track how stale the configuration is.
    pub fn update_config_age(&self) {
        let age_secs = self.last_update.lock().elapsed().as_secs() as i64;
        self.config_age_seconds.record(age_secs, &[]);
    }
}

impl std::fmt::Debug for ReloadMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReloadMetrics").finish_non_exhaustive()
    }
}
