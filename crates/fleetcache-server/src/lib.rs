pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod notifier;
pub mod observability;
pub mod observer;
pub mod scope;
pub mod server;
pub mod users;

pub use config::{AppConfig, CacheConfig, LogBackend, LogConfig, RedisConfig, ServerConfig};
pub use error::{ApiError, DecodeFailure, DecodeFailures, InvalidateError, ObserveError, ServerError};
pub use middleware::{CoherenceState, coherence};
pub use notifier::Notifier;
pub use observability::{NoopObservability, Observability, TracingObservability, init_tracing};
pub use observer::{Observation, Observer};
pub use scope::CacheScope;
pub use server::{AppState, Components, FleetcacheServer, ServerBuilder, UserCache, build_app};
pub use users::{User, UserStore, user_identifier};
