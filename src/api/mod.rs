//! HTTP surface: routes, handlers, auth middleware and service wiring.

mod handlers;
mod middleware;
mod server;


pub use server::{serve, ApiVersion};

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::audit::AuditShipper;
use crate::config::Account;
use crate::error::{Error, ErrorCode};
use crate::metrics::Metrics;
use crate::queue::JobQueue;
use crate::repository::Repository;
use crate::runner::Runner;

/// Everything the handlers need, cloned per request.
pub struct AppState<R, Q> {
    pub accounts: Arc<HashMap<String, Account>>,
    pub repository: R,
    pub queue: Q,
    pub runners: Arc<HashMap<String, Runner>>,
    pub audit: Arc<dyn AuditShipper>,
    pub metrics: Arc<Metrics>,
    pub version: Arc<ApiVersion>,
}

impl<R: Repository, Q: JobQueue> Clone for AppState<R, Q> {
    fn clone(&self) -> Self {
        Self {
            accounts: Arc::clone(&self.accounts),
            repository: self.repository.clone(),
            queue: self.queue.clone(),
            runners: Arc::clone(&self.runners),
            audit: Arc::clone(&self.audit),
            metrics: Arc::clone(&self.metrics),
            version: Arc::clone(&self.version),
        }
    }
}

/// Wraps [`Error`] so handlers can use `?` and still produce the structured
/// `{code, message}` body with the right status.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.code() {
            ErrorCode::BadRequest => StatusCode::BAD_REQUEST,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::LimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        tracing::warn!(status = %status, error = %self.0, "request failed");

        let body = serde_json::json!({
            "code": self.0.code().as_str(),
            "message": self.0.message(),
        });
        (status, Json(body)).into_response()
    }
}
