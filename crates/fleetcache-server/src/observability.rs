// Tracing initialization with a reloadable level, plus the observability
// collaborator handed to the coherence middleware.
use std::sync::OnceLock;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

use crate::metrics;

static LOG_RELOAD_HANDLE: OnceLock<reload::Handle<EnvFilter, tracing_subscriber::Registry>> =
    OnceLock::new();

pub fn init_tracing() {
    init_tracing_with_level("info");
}

pub fn init_tracing_with_level(level: &str) {
    // RUST_LOG wins over the configured level.
    let base_filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|_| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(level));

    let (reload_layer, handle) = reload::Layer::new(base_filter);
    let _ = LOG_RELOAD_HANDLE.set(handle);

    let _ = tracing_subscriber::registry()
        .with(reload_layer)
        .with(fmt::layer())
        .try_init();
}

/// Apply a new logging level at runtime if the reload handle is configured.
pub fn apply_logging_level(level: &str) {
    if std::env::var("RUST_LOG").is_ok() {
        return;
    }
    if let Some(handle) = LOG_RELOAD_HANDLE.get() {
        let _ = handle.modify(|f| {
            *f = EnvFilter::new(level);
        });
    }
}

/// Where the coherence layer reports what it did.
pub trait Observability: Send + Sync {
    fn record_event(&self, event: &'static str, count: u64);
    fn record_error(&self, context: &'static str, error: &dyn std::error::Error);
    fn record_request(&self, duration: Duration, time_saved: Duration);
    fn record_evictions(&self, count: usize);
    fn record_entries(&self, _count: usize) {}
}

/// Event names passed to [`Observability::record_event`].
pub mod events {
    pub const INVALIDATIONS_OBSERVED: &str = "invalidations.observed";
    pub const OBSERVER_RESET: &str = "observer.reset";
    pub const RECORDS_SKIPPED: &str = "records.skipped";
}

/// Error contexts passed to [`Observability::record_error`].
pub mod contexts {
    pub const OBSERVE: &str = "observe";
    pub const DECODE: &str = "decode";
    pub const PUBLISH: &str = "publish";
}

/// Logs through `tracing` and records Prometheus metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObservability;

impl Observability for TracingObservability {
    fn record_event(&self, event: &'static str, count: u64) {
        tracing::debug!(event, count, "cache event");
        if event == events::INVALIDATIONS_OBSERVED {
            metrics::record_invalidations_observed(count);
        }
    }

    fn record_error(&self, context: &'static str, error: &dyn std::error::Error) {
        tracing::warn!(context, error = %error, "cache coherence error");
        match context {
            contexts::OBSERVE => metrics::record_observe_error(),
            contexts::PUBLISH => metrics::record_publish_failure(),
            _ => {}
        }
    }

    fn record_request(&self, duration: Duration, time_saved: Duration) {
        tracing::debug!(
            duration_ms = duration.as_millis() as u64,
            time_saved_ms = time_saved.as_millis() as u64,
            "request served"
        );
        metrics::record_request(duration, time_saved);
    }

    fn record_evictions(&self, count: usize) {
        tracing::debug!(count, "expired entries evicted");
        metrics::record_evictions(count);
    }

    fn record_entries(&self, count: usize) {
        metrics::record_cache_entries(count);
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObservability;

impl Observability for NoopObservability {
    fn record_event(&self, _event: &'static str, _count: u64) {}
    fn record_error(&self, _context: &'static str, _error: &dyn std::error::Error) {}
    fn record_request(&self, _duration: Duration, _time_saved: Duration) {}
    fn record_evictions(&self, _count: usize) {}
}
