use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use fleetcache_core::Cache;

use crate::notifier::Notifier;
use crate::observability::{Observability, contexts, events};
use crate::observer::Observer;
use crate::scope::CacheScope;

/// Shared state of the coherence middleware.
pub struct CoherenceState<V> {
    pub cache: Arc<Cache<V>>,
    pub observer: Arc<Observer>,
    pub notifier: Notifier,
    pub observability: Arc<dyn Observability>,
}

impl<V> Clone for CoherenceState<V> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            observer: Arc::clone(&self.observer),
            notifier: self.notifier.clone(),
            observability: Arc::clone(&self.observability),
        }
    }
}

impl<V: Clone> CoherenceState<V> {
    pub fn new(
        cache: Arc<Cache<V>>,
        observer: Arc<Observer>,
        notifier: Notifier,
        observability: Arc<dyn Observability>,
    ) -> Self {
        Self {
            cache,
            observer,
            notifier,
            observability,
        }
    }

    /// Sweeps expired entries, then applies invalidations published since
    /// the last request.
    ///
    /// An empty cache resets the observer first. The read that follows starts
    /// at the tail of every shard and pins those positions, so anything the
    /// handler caches next is covered by later invalidations.
    ///
    /// Log failures are recorded and otherwise ignored: the request is served
    /// from whatever the cache holds.
    pub async fn synchronize(&self) {
        let expired = self.cache.remove_expired();
        if expired > 0 {
            self.observability.record_evictions(expired);
        }

        // Another request may insert between the sweep and this check; that
        // only costs keeping an older cursor.
        if self.cache.count() == 0 {
            self.observer.reset().await;
            self.observability.record_event(events::OBSERVER_RESET, 1);
        }

        let observation = match self.observer.observe().await {
            Ok(observation) => observation,
            Err(e) => {
                self.observability.record_error(contexts::OBSERVE, &e);
                return;
            }
        };

        if let Some(failures) = observation.error() {
            self.observability.record_error(contexts::DECODE, failures);
        }
        if observation.skipped_records > 0 {
            self.observability
                .record_event(events::RECORDS_SKIPPED, observation.skipped_records as u64);
        }
        if !observation.ids.is_empty() {
            self.cache
                .remove_many(observation.ids.iter().map(ToString::to_string));
            self.observability
                .record_event(events::INVALIDATIONS_OBSERVED, observation.ids.len() as u64);
        }
        self.observability.record_entries(self.cache.count());
    }

    pub fn scope(&self) -> CacheScope<V> {
        CacheScope::new(
            Arc::clone(&self.cache),
            self.notifier.clone(),
            Arc::clone(&self.observability),
        )
    }
}

/// Keeps the local cache coherent with the fleet before every request and
/// exposes a [`CacheScope`] to the handler.
pub async fn coherence<V>(
    State(state): State<CoherenceState<V>>,
    mut request: Request,
    next: Next,
) -> Response
where
    V: Clone + Send + Sync + 'static,
{
    let started = Instant::now();
    state.synchronize().await;

    let scope = state.scope();
    request.extensions_mut().insert(scope.clone());
    let response = next.run(request).await;

    state
        .observability
        .record_request(started.elapsed(), scope.time_saved());
    response
}
