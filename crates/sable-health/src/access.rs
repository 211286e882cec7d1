//! Access key middleware.
//!
//! # Rust Learning Note
//!
//! `axum::middleware::from_fn_with_state` turns a plain async function into
//! a tower layer. The function sees the request before the handler and
//! either answers itself or passes the request on with `next.run(request)`:
//!
//! ```rust,ignore
//! Router::new()
//!     .route("/health", get(health))
//!     .layer(middleware::from_fn_with_state(guard, require_access_key));
//! ```

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use sable_registry::ACCESS_KEY_HEADER;
use std::sync::Arc;
use tracing::warn;

/// Requires `X-ACCESS-KEY` on every path under `path`.
#[derive(Debug, Clone)]
pub struct AccessKeyGuard {
    path: String,
    key: String,
}

impl AccessKeyGuard {
    pub fn new(path: impl Into<String>, key: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            path: path.trim_end_matches('/').to_string(),
            key: key.into(),
        }
    }

    /// True if `request_path` is `path` or below it, segment-wise.
    pub fn covers(&self, request_path: &str) -> bool {
        starts_with_segments(request_path, &self.path)
    }
}

/// `/health` and `/health/x` start with `/health`; `/healthz` does not.
/// Comparison ignores ASCII case.
pub fn starts_with_segments(path: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    let Some(head) = path.get(..prefix.len()) else {
        return false;
    };
    if !head.eq_ignore_ascii_case(prefix) {
        return false;
    }
    matches!(path.as_bytes().get(prefix.len()), None | Some(b'/'))
}

/// Middleware answering 401 when the key is missing or wrong.
pub async fn require_access_key(State(guard): State<Arc<AccessKeyGuard>>, request: Request, next: Next) -> Response {
    if !guard.covers(request.uri().path()) {
        return next.run(request).await;
    }

    let rejection = match request.headers().get(ACCESS_KEY_HEADER) {
        None => Some("Access key was not provided"),
        Some(value) if value.to_str().map_or(true, |key| key != guard.key) => Some("Access key does not match"),
        Some(_) => None,
    };

    if let Some(reason) = rejection {
        warn!(path = %request.uri().path(), "{}", reason);
        return StatusCode::UNAUTHORIZED.into_response();
    }
    next.run(request).await
}
