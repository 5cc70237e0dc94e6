//! Per-request view of the cache and notifier.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use fleetcache_core::{Cache, Identifier};
use parking_lot::Mutex;

use crate::error::InvalidateError;
use crate::notifier::Notifier;
use crate::observability::{Observability, contexts};

/// Handed to request handlers by the coherence middleware.
///
/// Clones share the same time-saved accumulator.
pub struct CacheScope<V> {
    cache: Arc<Cache<V>>,
    notifier: Notifier,
    observability: Arc<dyn Observability>,
    saved: Arc<Mutex<Duration>>,
}

impl<V> Clone for CacheScope<V> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            notifier: self.notifier.clone(),
            observability: Arc::clone(&self.observability),
            saved: Arc::clone(&self.saved),
        }
    }
}

impl<V: Clone> CacheScope<V> {
    pub fn new(
        cache: Arc<Cache<V>>,
        notifier: Notifier,
        observability: Arc<dyn Observability>,
    ) -> Self {
        Self {
            cache,
            notifier,
            observability,
            saved: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// The shared cache, for operations the scope does not wrap.
    pub fn cache(&self) -> &Arc<Cache<V>> {
        &self.cache
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Cached value for `id`; a hit adds its saved duration to this request.
    pub fn get(&self, id: &Identifier) -> Option<V> {
        let (value, saved) = self.cache.get_with_duration(&id.to_string())?;
        *self.saved.lock() += saved;
        Some(value)
    }

    pub fn add(&self, id: &Identifier, value: V) {
        self.cache.put(id.to_string(), value);
    }

    pub fn add_with_duration(&self, id: &Identifier, value: V, saved: Duration) {
        self.cache.put_with_duration(id.to_string(), value, saved);
    }

    /// Tells the fleet `id` changed.
    ///
    /// If the invalidation cannot be published, the key is evicted from
    /// this instance's cache and the publish error is returned.
    pub async fn invalidate(&self, id: &Identifier) -> Result<(), InvalidateError> {
        match self
            .notifier
            .notify_identifiers(std::slice::from_ref(id))
            .await
        {
            Ok(()) => Ok(()),
            Err(source) => {
                let key = id.to_string();
                self.cache.remove(&key);
                self.observability.record_error(contexts::PUBLISH, &source);
                Err(InvalidateError { key, source })
            }
        }
    }

    /// Total saved duration of this request's cache hits so far.
    pub fn time_saved(&self) -> Duration {
        *self.saved.lock()
    }
}

impl<S, V> FromRequestParts<S> for CacheScope<V>
where
    S: Send + Sync,
    V: Clone + Send + Sync + 'static,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CacheScope<V>>()
            .cloned()
            .ok_or((
                StatusCode::INTERNAL_SERVER_ERROR,
                "cache scope missing: coherence middleware not installed",
            ))
    }
}
