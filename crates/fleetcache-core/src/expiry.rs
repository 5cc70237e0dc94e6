//! Expiration policies.
//!
//! Entries written by many instances started at roughly the same time would
//! otherwise expire together and hit the source of truth in one burst, so
//! the default policy spreads expiry uniformly across a window.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use time::OffsetDateTime;
use time::macros::datetime;

use crate::clock::Clock;
use crate::error::{CoreError, Result};

/// Longest window a [`JitteredExpiry`] accepts: one hundred years.
pub const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Expiry used when `now + ttl` is not representable.
pub const FAR_FUTURE: OffsetDateTime = datetime!(9999-12-31 23:59:59.999999999 UTC);

/// `at + ttl`, saturating at [`FAR_FUTURE`].
pub fn saturating_expiry(at: OffsetDateTime, ttl: Duration) -> OffsetDateTime {
    time::Duration::try_from(ttl)
        .ok()
        .and_then(|ttl| at.checked_add(ttl))
        .unwrap_or(FAR_FUTURE)
}

/// Decides when a freshly written entry expires.
pub trait ExpirationPolicy: Send + Sync {
    fn expires_at(&self, clock: &dyn Clock) -> OffsetDateTime;
}

impl<F> ExpirationPolicy for F
where
    F: Fn(&dyn Clock) -> OffsetDateTime + Send + Sync,
{
    fn expires_at(&self, clock: &dyn Clock) -> OffsetDateTime {
        self(clock)
    }
}

/// Source of uniformly distributed integers.
pub trait RandomSource: Send + Sync + fmt::Debug {
    /// Returns a value in `0..=upper`.
    fn uniform_inclusive(&self, upper: u64) -> u64;
}

/// [`RandomSource`] backed by a `StdRng`.
#[derive(Debug)]
pub struct StdRandom {
    rng: Mutex<StdRng>,
}

impl StdRandom {
    /// Seeded from the operating system.
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic sequence, for tests.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for StdRandom {
    fn uniform_inclusive(&self, upper: u64) -> u64 {
        if upper == 0 {
            return 0;
        }
        self.rng.lock().gen_range(0..=upper)
    }
}

/// Expires every entry exactly `ttl` after it was written.
#[derive(Debug, Clone, Copy)]
pub struct FixedExpiry(pub Duration);

impl ExpirationPolicy for FixedExpiry {
    fn expires_at(&self, clock: &dyn Clock) -> OffsetDateTime {
        saturating_expiry(clock.now(), self.0)
    }
}

/// Expires entries at `now + min + uniform(0, max - min)`.
#[derive(Debug, Clone)]
pub struct JitteredExpiry {
    min: Duration,
    max: Duration,
    random: Arc<dyn RandomSource>,
}

impl JitteredExpiry {
    /// Window of one hour plus up to thirty minutes of jitter.
    pub const DEFAULT_MIN: Duration = Duration::from_secs(60 * 60);
    pub const DEFAULT_MAX: Duration = Duration::from_secs(90 * 60);

    pub fn new(min: Duration, max: Duration) -> Result<Self> {
        Self::with_random(min, max, Arc::new(StdRandom::from_entropy()))
    }

    pub fn with_random(min: Duration, max: Duration, random: Arc<dyn RandomSource>) -> Result<Self> {
        if min > max {
            return Err(CoreError::invalid_expiry_window(min, max));
        }
        if max > MAX_TTL {
            return Err(CoreError::expiry_too_long(max, MAX_TTL));
        }
        Ok(Self { min, max, random })
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }
}

impl Default for JitteredExpiry {
    fn default() -> Self {
        Self {
            min: Self::DEFAULT_MIN,
            max: Self::DEFAULT_MAX,
            random: Arc::new(StdRandom::from_entropy()),
        }
    }
}

impl ExpirationPolicy for JitteredExpiry {
    fn expires_at(&self, clock: &dyn Clock) -> OffsetDateTime {
        let span_ms = u64::try_from((self.max - self.min).as_millis()).unwrap_or(u64::MAX);
        let jitter = Duration::from_millis(self.random.uniform_inclusive(span_ms));
        saturating_expiry(clock.now(), self.min + jitter)
    }
}
