//! Concurrent in-process cache with per-entry expiry.
//!
//! Entries live in a sharded `DashMap`, so operations on different keys only
//! contend when they hash to the same shard. Expiry is advisory: an entry past
//! its expiry is still returned by [`Cache::get`] until [`Cache::remove_expired`]
//! sweeps it. Sweeping is cheap enough to run at the start of every request.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use time::OffsetDateTime;

use crate::clock::{Clock, SystemClock};
use crate::expiry::{ExpirationPolicy, JitteredExpiry};

/// A value stored in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry<V> {
    pub value: V,
    pub expiry: OffsetDateTime,
    /// How long the original fetch of `value` took, i.e. the time saved each
    /// time this entry is served from the cache.
    pub saved: Duration,
}

impl<V> CacheEntry<V> {
    pub fn new(value: V, expiry: OffsetDateTime, saved: Duration) -> Self {
        Self {
            value,
            expiry,
            saved,
        }
    }

    /// Whether the entry has expired relative to `now`.
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expiry <= now
    }
}

/// Concurrent mapping from string key to [`CacheEntry`].
///
/// Cloning a `Cache` is not supported; share it behind an `Arc`.
pub struct Cache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    clock: Arc<dyn Clock>,
    expiration: Arc<dyn ExpirationPolicy>,
}

impl<V> Cache<V>
where
    V: Clone,
{
    /// Wall clock, one hour to ninety minutes of jittered expiry.
    pub fn new() -> Self {
        Self::with_policy(Arc::new(SystemClock), Arc::new(JitteredExpiry::default()))
    }

    pub fn with_policy(clock: Arc<dyn Clock>, expiration: Arc<dyn ExpirationPolicy>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            expiration,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Store `value` under `key`, replacing any existing entry.
    pub fn put(&self, key: impl Into<String>, value: V) {
        self.put_with_duration(key, value, Duration::ZERO);
    }

    /// Store `value` under `key`, recording how long it took to produce.
    pub fn put_with_duration(&self, key: impl Into<String>, value: V, saved: Duration) {
        let expiry = self.expiration.expires_at(self.clock.as_ref());
        self.put_entry(key, CacheEntry::new(value, expiry, saved));
    }

    /// Store a fully built entry, bypassing the expiration policy.
    pub fn put_entry(&self, key: impl Into<String>, entry: CacheEntry<V>) {
        self.entries.insert(key.into(), entry);
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    /// The cached value together with the time saved by not fetching it.
    pub fn get_with_duration(&self, key: &str) -> Option<(V, Duration)> {
        self.entries
            .get(key)
            .map(|entry| (entry.value.clone(), entry.saved))
    }

    pub fn get_entry(&self, key: &str) -> Option<CacheEntry<V>> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Removing an absent key is a no-op.
    pub fn remove(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn remove_many<I, K>(&self, keys: I)
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        for key in keys {
            self.remove(key.as_ref());
        }
    }

    /// Delete every entry whose expiry is at or before the clock's `now`.
    ///
    /// Shards are locked one at a time, so concurrent readers and writers of
    /// other shards are never blocked. Returns the number of entries removed.
    pub fn remove_expired(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let expired = entry.is_expired_at(now);
            removed += usize::from(expired);
            !expired
        });
        if removed > 0 {
            tracing::debug!(removed, "swept expired cache entries");
        }
        removed
    }

    /// Number of entries currently stored. Advisory under concurrent writes.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Clone> Default for Cache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for Cache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("entries", &self.entries.len())
            .field("clock", &self.clock)
            .finish()
    }
}
