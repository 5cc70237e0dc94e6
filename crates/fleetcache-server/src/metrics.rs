//! Prometheus metrics for the fleetcache server.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metric names as constants for consistency.
pub mod names {
    pub const INVALIDATIONS_OBSERVED_TOTAL: &str = "fleetcache_invalidations_observed_total";
    pub const OBSERVE_ERRORS_TOTAL: &str = "fleetcache_observe_errors_total";
    pub const PUBLISH_FAILURES_TOTAL: &str = "fleetcache_publish_failures_total";
    pub const EVICTIONS_TOTAL: &str = "fleetcache_evictions_total";
    pub const REQUEST_DURATION_SECONDS: &str = "fleetcache_request_duration_seconds";
    pub const TIME_SAVED_SECONDS: &str = "fleetcache_time_saved_seconds";
    pub const ENTRIES: &str = "fleetcache_entries";
}

/// Initialize the Prometheus metrics exporter.
///
/// Returns `true` if initialization succeeded, `false` if already initialized.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        tracing::debug!("Prometheus metrics already initialized");
        return false;
    }

    // Pull-based; /metrics renders the handle.
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROMETHEUS_HANDLE.set(handle).is_err() {
                tracing::warn!("Failed to store Prometheus handle (already set)");
                return false;
            }
            tracing::info!("Prometheus metrics initialized");
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Prometheus recorder");
            false
        }
    }
}

/// Render all metrics in Prometheus text format, or `None` before init.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|handle| handle.render())
}

pub fn record_invalidations_observed(count: u64) {
    counter!(names::INVALIDATIONS_OBSERVED_TOTAL).increment(count);
}

pub fn record_observe_error() {
    counter!(names::OBSERVE_ERRORS_TOTAL).increment(1);
}

pub fn record_publish_failure() {
    counter!(names::PUBLISH_FAILURES_TOTAL).increment(1);
}

pub fn record_evictions(count: usize) {
    counter!(names::EVICTIONS_TOTAL).increment(count as u64);
}

/// Record one request's duration and the fetch time its cache hits avoided.
pub fn record_request(duration: Duration, time_saved: Duration) {
    histogram!(names::REQUEST_DURATION_SECONDS).record(duration.as_secs_f64());
    histogram!(names::TIME_SAVED_SECONDS).record(time_saved.as_secs_f64());
}

pub fn record_cache_entries(count: usize) {
    gauge!(names::ENTRIES).set(count as f64);
}
