use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, middleware, routing::get};
use fleetcache_core::{Cache, JitteredExpiry, SystemClock};
use fleetcache_log::{DynTransport, InvalidationLog, MemoryTransport, RedisStreamTransport};
use tower_http::trace::TraceLayer;

use crate::config::{AppConfig, LogBackend};
use crate::error::ServerError;
use crate::middleware::{CoherenceState, coherence};
use crate::notifier::Notifier;
use crate::observability::{Observability, TracingObservability};
use crate::observer::Observer;
use crate::users::{self, User, UserStore};
use crate::{handlers, metrics};

/// Cache of the demo user service.
pub type UserCache = Cache<User>;

/// State shared by the route handlers.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<UserCache>,
    pub users: Arc<UserStore>,
}

/// Everything one instance needs to stay coherent with the fleet.
#[derive(Clone)]
pub struct Components {
    pub cache: Arc<UserCache>,
    pub observer: Arc<Observer>,
    pub notifier: Notifier,
    pub observability: Arc<dyn Observability>,
    pub users: Arc<UserStore>,
}

impl Components {
    /// Wires a cache, observer and notifier around one invalidation log.
    pub fn new(
        cfg: &AppConfig,
        log: InvalidationLog,
        observability: Arc<dyn Observability>,
        users: Arc<UserStore>,
    ) -> Result<Self, ServerError> {
        let expiry = JitteredExpiry::new(cfg.cache.min_ttl(), cfg.cache.max_ttl())?;
        let cache = Arc::new(Cache::with_policy(Arc::new(SystemClock), Arc::new(expiry)));
        Ok(Self {
            cache,
            observer: Arc::new(Observer::new(Arc::new(log.clone()))),
            notifier: Notifier::new(Arc::new(log)),
            observability,
            users,
        })
    }
}

pub struct FleetcacheServer {
    addr: SocketAddr,
    app: Router,
    components: Components,
}

pub fn build_app(cfg: &AppConfig, components: &Components) -> Router {
    let body_limit = cfg.server.body_limit_bytes;
    let coherence_state = CoherenceState::new(
        Arc::clone(&components.cache),
        Arc::clone(&components.observer),
        components.notifier.clone(),
        Arc::clone(&components.observability),
    );
    let state = AppState {
        cache: Arc::clone(&components.cache),
        users: Arc::clone(&components.users),
    };

    // Only cache-backed routes pay for observing the log.
    let cached = Router::new()
        .route("/user/{id}", get(users::get_user).post(users::put_user))
        .route_layer(middleware::from_fn_with_state(
            coherence_state,
            coherence::<User>,
        ));

    let mut router = Router::new().route("/healthz", get(handlers::healthz));
    if cfg.metrics.enabled {
        router = router.route("/metrics", get(handlers::metrics));
    }

    router
        .merge(cached)
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
    transport: Option<DynTransport>,
    observability: Option<Arc<dyn Observability>>,
    users: Option<Arc<UserStore>>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
            transport: None,
            observability: None,
            users: None,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Use `transport` instead of the one `log.backend` selects.
    pub fn with_transport(mut self, transport: DynTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_observability(mut self, observability: Arc<dyn Observability>) -> Self {
        self.observability = Some(observability);
        self
    }

    pub fn with_user_store(mut self, users: Arc<UserStore>) -> Self {
        self.users = Some(users);
        self
    }

    pub async fn build(self) -> Result<FleetcacheServer, ServerError> {
        self.config.validate().map_err(ServerError::Config)?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => create_transport(&self.config).await?,
        };
        let log = InvalidationLog::with_options(transport, self.config.log.options());

        if self.config.metrics.enabled {
            metrics::init_metrics();
        }
        let observability = self
            .observability
            .unwrap_or_else(|| Arc::new(TracingObservability));
        let users = self.users.unwrap_or_default();

        let components = Components::new(&self.config, log, observability, users)?;
        let app = build_app(&self.config, &components);

        Ok(FleetcacheServer {
            addr: self.addr,
            app,
            components,
        })
    }
}

async fn create_transport(cfg: &AppConfig) -> Result<DynTransport, ServerError> {
    match cfg.log.backend {
        LogBackend::Memory => {
            tracing::info!(
                shards = cfg.log.shards,
                "Using in-memory invalidation log; invalidations stay on this instance"
            );
            Ok(Arc::new(
                MemoryTransport::new(cfg.log.shards)
                    .with_page_size(cfg.log.page_size)
                    .with_shard_page_size(cfg.log.page_size),
            ))
        }
        LogBackend::Redis => {
            let options = cfg.redis_stream_options();
            let transport = RedisStreamTransport::connect(&options).await?;
            tracing::info!(prefix = %options.stream_prefix, "✓ Connected to Redis invalidation log");
            Ok(Arc::new(transport))
        }
    }
}

impl FleetcacheServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn router(&self) -> Router {
        self.app.clone()
    }

    pub fn components(&self) -> &Components {
        &self.components
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
