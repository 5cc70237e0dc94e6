//! # fleetcache-core
//!
//! The process-local half of fleetcache: canonical [`Identifier`]s for cached
//! data and the concurrent, jittered-TTL [`Cache`].
//!
//! Cross-process coherence lives in `fleetcache-log` (the invalidation log)
//! and `fleetcache-server` (observer, notifier and request middleware).

pub mod cache;
pub mod clock;
pub mod error;
pub mod expiry;
pub mod id;

pub use cache::{Cache, CacheEntry};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CoreError, Result};
pub use expiry::{
    ExpirationPolicy, FAR_FUTURE, FixedExpiry, JitteredExpiry, MAX_TTL, RandomSource, StdRandom,
};
pub use id::{IDENTIFIER_MARKER, Identifier, IdentifierError, Observable};
