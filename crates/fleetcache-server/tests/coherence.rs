//! Two instances sharing one invalidation log.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use fleetcache_core::CacheEntry;
use fleetcache_log::MemoryTransport;
use fleetcache_server::{
    AppConfig, FleetcacheServer, NoopObservability, Observability, ServerBuilder, User, UserStore,
    user_identifier,
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tower::ServiceExt;

fn test_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.metrics.enabled = false;
    cfg
}

async fn instance(
    transport: Arc<MemoryTransport>,
    users: Arc<UserStore>,
    observability: Arc<dyn Observability>,
) -> FleetcacheServer {
    ServerBuilder::new()
        .with_config(test_config())
        .with_transport(transport)
        .with_user_store(users)
        .with_observability(observability)
        .build()
        .await
        .expect("build server")
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(path: &str) -> Request<Body> {
    Request::get(path).body(Body::empty()).unwrap()
}

fn post_json(path: &str, body: Value) -> Request<Body> {
    Request::post(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn seed_user(users: &UserStore, id: u64, name: &str) {
    users.upsert(User {
        id,
        name: name.into(),
        email: format!("{name}@example.com"),
    });
}

#[tokio::test]
async fn invalidation_on_one_instance_evicts_on_another() {
    let transport = Arc::new(MemoryTransport::new(4));
    let users = Arc::new(UserStore::new());
    seed_user(&users, 42, "ada");

    let a = instance(transport.clone(), users.clone(), Arc::new(NoopObservability)).await;
    let b = instance(transport.clone(), users.clone(), Arc::new(NoopObservability)).await;

    // A's cache starts empty; its only request fetches and caches user 42.
    let (status, body) = send(a.router(), get("/user/42")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "ada");
    assert_eq!(users.fetch_count(), 1);

    // B writes the user and publishes the invalidation.
    let (status, _) = send(
        b.router(),
        post_json("/user/42", json!({"name": "grace", "email": "grace@example.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(transport.record_count(), 1);

    // A evicts before its handler runs, so the handler refetches.
    let (status, body) = send(a.router(), get("/user/42")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "grace");
    assert_eq!(users.fetch_count(), 2);
}

#[tokio::test]
async fn empty_cache_reads_every_shard_from_the_tail() {
    let transport = Arc::new(MemoryTransport::new(3));
    let users = Arc::new(UserStore::new());
    seed_user(&users, 1, "ken");
    let a = instance(transport.clone(), users, Arc::new(NoopObservability)).await;

    send(a.router(), get("/user/1")).await;

    let opened = transport.opened_cursors();
    assert_eq!(opened.len(), 3);
    assert!(opened.iter().all(|(_, after)| after.is_none()));
    assert_eq!(a.components().observer.cursor().await.len(), 3);
}

#[tokio::test]
async fn observer_reports_the_invalidated_identifier() {
    let transport = Arc::new(MemoryTransport::new(2));
    let users = Arc::new(UserStore::new());
    let a = instance(transport.clone(), users.clone(), Arc::new(NoopObservability)).await;
    let b = instance(transport, users, Arc::new(NoopObservability)).await;

    let observer = &a.components().observer;
    observer.observe().await.unwrap();

    b.components()
        .notifier
        .notify_identifiers(&[user_identifier(42)])
        .await
        .unwrap();

    let observation = observer.observe().await.unwrap();
    assert_eq!(observation.ids, vec![user_identifier(42)]);
    assert!(observation.error().is_none());
}

#[tokio::test]
async fn publish_failure_evicts_locally_and_still_serves() {
    let transport = Arc::new(MemoryTransport::new(2));
    let users = Arc::new(UserStore::new());
    seed_user(&users, 7, "linus");
    let a = instance(transport.clone(), users.clone(), Arc::new(NoopObservability)).await;

    send(a.router(), get("/user/7")).await;
    let key = user_identifier(7).to_string();
    assert!(a.components().cache.get(&key).is_some());

    transport.set_unavailable(true);
    let (status, body) = send(
        a.router(),
        post_json("/user/7", json!({"name": "torvalds", "email": "t@example.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "torvalds");
    assert!(a.components().cache.get(&key).is_none());

    // Reads keep working from the source while the log is down.
    let (status, body) = send(a.router(), get("/user/7")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "torvalds");
}

#[tokio::test]
async fn expired_entries_are_swept_before_the_handler() {
    let transport = Arc::new(MemoryTransport::new(1));
    let a = instance(transport, Arc::new(UserStore::new()), Arc::new(NoopObservability)).await;
    let cache = &a.components().cache;

    let stale = User {
        id: 9,
        name: "old".into(),
        email: "old@example.com".into(),
    };
    cache.put_entry(
        user_identifier(9).to_string(),
        CacheEntry::new(stale, time::OffsetDateTime::UNIX_EPOCH, Duration::ZERO),
    );
    assert_eq!(cache.count(), 1);

    // The user is gone from the source, so a swept entry means 404.
    let (status, _) = send(a.router(), get("/user/9")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(cache.count(), 0);
}

#[tokio::test]
async fn bad_bodies_are_unprocessable() {
    let a = instance(
        Arc::new(MemoryTransport::new(1)),
        Arc::new(UserStore::new()),
        Arc::new(NoopObservability),
    )
    .await;

    let request = Request::post("/user/1")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(a.router(), request).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].is_string());

    let (status, _) = send(a.router(), post_json("/user/1", json!({"name": 5}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[derive(Default)]
struct RecordingObservability {
    requests: Mutex<Vec<(Duration, Duration)>>,
    errors: Mutex<Vec<&'static str>>,
}

impl Observability for RecordingObservability {
    fn record_event(&self, _event: &'static str, _count: u64) {}

    fn record_error(&self, context: &'static str, _error: &dyn std::error::Error) {
        self.errors.lock().push(context);
    }

    fn record_request(&self, duration: Duration, time_saved: Duration) {
        self.requests.lock().push((duration, time_saved));
    }

    fn record_evictions(&self, _count: usize) {}
}

#[tokio::test]
async fn time_saved_and_log_errors_are_recorded() {
    let transport = Arc::new(MemoryTransport::new(1));
    let users = Arc::new(UserStore::with_latency(Duration::from_millis(20)));
    seed_user(&users, 1, "ken");
    let observability = Arc::new(RecordingObservability::default());
    let a = instance(transport.clone(), users, observability.clone()).await;

    send(a.router(), get("/user/1")).await;
    send(a.router(), get("/user/1")).await;
    {
        let requests = observability.requests.lock();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].1, Duration::ZERO);
        assert!(requests[1].1 >= Duration::from_millis(20));
    }

    // A failing log does not fail the request.
    transport.set_unavailable(true);
    let (status, _) = send(a.router(), get("/user/1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(observability.errors.lock().as_slice(), &["observe"]);
}

#[tokio::test]
async fn oversized_ttl_is_rejected_at_build() {
    let mut cfg = test_config();
    cfg.cache.min_ttl_secs = 400_000_000_000;
    cfg.cache.max_ttl_secs = 400_000_000_000;
    let result = ServerBuilder::new()
        .with_config(cfg)
        .with_transport(Arc::new(MemoryTransport::new(1)))
        .build()
        .await;
    assert!(result.is_err());
}
