//! Token auth and request bounds.
//!
//! Private routes demand an `X-Auth-Token` header whose value is a bcrypt
//! hash of the configured pre-shared key. OPTIONS preflights are answered
//! unauthenticated with the CORS headers the browser needs to send the token
//! header at all.

use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

pub const AUTH_HEADER: &str = "X-Auth-Token";

const PUBLIC_PATHS: [&str; 3] = [
    "/v1/minion/ping",
    "/v1/minion/version",
    "/v1/minion/metrics",
];

const REQUEST_DEADLINE: Duration = Duration::from_secs(15);

#[derive(Clone)]
pub struct AuthConfig {
    pub token: String,
}

pub async fn token_auth(
    State(auth): State<AuthConfig>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS {
        return preflight();
    }

    if PUBLIC_PATHS.contains(&request.uri().path()) {
        return next.run(request).await;
    }

    let presented = request
        .headers()
        .get(AUTH_HEADER)
        .and_then(|v| v.to_str().ok());

    match presented {
        Some(hash) if bcrypt::verify(&auth.token, hash).unwrap_or(false) => {
            next.run(request).await
        }
        Some(_) => {
            tracing::warn!(path = %request.uri().path(), "invalid auth token");
            StatusCode::UNAUTHORIZED.into_response()
        }
        None => {
            tracing::warn!(path = %request.uri().path(), "missing auth token");
            StatusCode::UNAUTHORIZED.into_response()
        }
    }
}

fn preflight() -> Response {
    (
        StatusCode::OK,
        [
            (
                header::ACCESS_CONTROL_ALLOW_ORIGIN,
                HeaderValue::from_static("*"),
            ),
            (
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static(AUTH_HEADER),
            ),
        ],
    )
        .into_response()
}

/// Bound every request so a stuck backend cannot hold a connection open
/// past the drain window.
pub async fn request_deadline(request: Request, next: Next) -> Response {
    match tokio::time::timeout(REQUEST_DEADLINE, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            tracing::error!("request exceeded deadline");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
