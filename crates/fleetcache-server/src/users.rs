//! Demo user service: reads go through the cache, writes invalidate.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};
use dashmap::DashMap;
use fleetcache_core::{Identifier, Observable};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::scope::CacheScope;
use crate::server::AppState;

/// Source name of user identifiers.
pub const USER_SOURCE: &str = "db.users.userid";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub email: String,
}

impl Observable for User {
    fn observable_id(&self) -> Identifier {
        user_identifier(self.id)
    }
}

pub fn user_identifier(id: u64) -> Identifier {
    Identifier::new(USER_SOURCE, id.to_string())
}

/// Body of `POST /user/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct UserInput {
    pub name: String,
    pub email: String,
}

/// Stand-in for the source of truth, with an optional simulated fetch delay.
#[derive(Debug, Default)]
pub struct UserStore {
    users: DashMap<u64, User>,
    latency: Duration,
    fetches: AtomicUsize,
}

impl UserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub async fn fetch(&self, id: u64) -> Option<User> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.users.get(&id).map(|user| user.clone())
    }

    pub fn upsert(&self, user: User) {
        self.users.insert(user.id, user);
    }

    /// Number of `fetch` calls so far, hits and misses alike.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

pub async fn get_user(
    State(state): State<AppState>,
    scope: CacheScope<User>,
    Path(id): Path<u64>,
) -> Result<Json<User>, ApiError> {
    let key = user_identifier(id);
    if let Some(user) = scope.get(&key) {
        tracing::debug!(user.id = id, "user served from cache");
        return Ok(Json(user));
    }

    let started = Instant::now();
    let user = state
        .users
        .fetch(id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("user {id}")))?;
    scope.add_with_duration(&key, user.clone(), started.elapsed());
    Ok(Json(user))
}

pub async fn put_user(
    State(state): State<AppState>,
    scope: CacheScope<User>,
    Path(id): Path<u64>,
    payload: Result<Json<UserInput>, JsonRejection>,
) -> Result<Json<User>, ApiError> {
    let Json(input) = payload.map_err(|e| ApiError::UnprocessableEntity(e.body_text()))?;
    let user = User {
        id,
        name: input.name,
        email: input.email,
    };
    state.users.upsert(user.clone());

    if let Err(e) = scope.invalidate(&user.observable_id()).await {
        // Already evicted locally; other instances may serve the old value
        // until their entries expire.
        tracing::warn!(user.id = id, error = %e, "user updated but invalidation not published");
    }
    Ok(Json(user))
}
