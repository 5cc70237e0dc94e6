use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

use crate::server::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    entries: usize,
}

pub async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    let entries = state.cache.count();
    crate::metrics::record_cache_entries(entries);
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            entries,
        }),
    )
}

pub async fn metrics() -> impl IntoResponse {
    match crate::metrics::render_metrics() {
        Some(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics not initialized").into_response(),
    }
}
