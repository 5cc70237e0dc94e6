//! Server error types.

use std::fmt;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use fleetcache_core::{CoreError, IdentifierError};
use fleetcache_log::LogError;
use thiserror::Error;

/// The log could not be read; the observer cursor was left unchanged.
#[derive(Debug, Error)]
#[error("observer: could not read from log: {source}")]
pub struct ObserveError {
    #[from]
    source: LogError,
}

impl ObserveError {
    pub fn log_error(&self) -> &LogError {
        &self.source
    }
}

/// One raw log key that did not decode as an identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeFailure {
    pub raw: String,
    pub error: IdentifierError,
}

impl fmt::Display for DecodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.raw, self.error)
    }
}

/// Every decode failure of one observation, in the order encountered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeFailures(Vec<DecodeFailure>);

impl DecodeFailures {
    pub fn push(&mut self, failure: DecodeFailure) {
        self.0.push(failure);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DecodeFailure> {
        self.0.iter()
    }
}

impl fmt::Display for DecodeFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for DecodeFailures {}

/// Publishing an invalidation failed. The key was evicted locally instead.
#[derive(Debug, Error)]
#[error("invalidate: could not publish {key}: {source}")]
pub struct InvalidateError {
    pub key: String,
    #[source]
    pub source: LogError,
}

/// Errors raised while assembling the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("log transport error: {0}")]
    Log(#[from] LogError),
}

/// Errors returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Unprocessable entity: {0}")]
    UnprocessableEntity(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::UnprocessableEntity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.to_string() });
        (self.status_code(), Json(body)).into_response()
    }
}
