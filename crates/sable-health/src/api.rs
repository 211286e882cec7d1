//! Health HTTP surface.
//!
//! | Route | Auth | Answer |
//! |---|---|---|
//! | `GET /ping` | none | `200 pong` while the process serves |
//! | `GET /health` | `X-ACCESS-KEY` | report, `200` or `503` when unhealthy |
//! | `PUT /health/switch/:state` | `X-ACCESS-KEY` | flips the manual switch |

use crate::access::{require_access_key, AccessKeyGuard};
use crate::switch::{HealthReport, HealthState, ManualHealthSwitch};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

pub const PING_ROUTE: &str = "/ping";
pub const HEALTH_ROUTE: &str = "/health";

/// Shared state of the health handlers.
#[derive(Debug, Clone)]
pub struct HealthContext {
    pub service: String,
    pub switch: Arc<ManualHealthSwitch>,
}

impl HealthContext {
    pub fn new(service: impl Into<String>, switch: Arc<ManualHealthSwitch>) -> Self {
        Self {
            service: service.into(),
            switch,
        }
    }
}

/// Creates the health router; everything under `/health` requires `access_key`.
pub fn create_router(context: HealthContext, access_key: impl Into<String>) -> Router {
    let guard = Arc::new(AccessKeyGuard::new(HEALTH_ROUTE, access_key));

    Router::new()
        .route(PING_ROUTE, get(ping_handler))
        .route(HEALTH_ROUTE, get(health_handler))
        .route("/health/switch/:state", put(switch_handler))
        .with_state(context)
        .layer(middleware::from_fn_with_state(guard, require_access_key))
}

async fn ping_handler() -> &'static str {
    "pong"
}

async fn health_handler(State(context): State<HealthContext>) -> (StatusCode, Json<HealthReport>) {
    let report = context.switch.report(&context.service);
    let status = if report.status.is_serving() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    debug!(status = %report.status, "Health requested");
    (status, Json(report))
}

async fn switch_handler(
    State(context): State<HealthContext>,
    Path(state): Path<String>,
) -> Result<StatusCode, ApiError> {
    let next: HealthState = state.parse().map_err(ApiError::BadRequest)?;
    context.switch.set(next);
    Ok(StatusCode::NO_CONTENT)
}

/// Error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// API error type.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        error!("API error: {} - {}", status, message);

        let body = Json(ErrorResponse { error: message });
        (status, body).into_response()
    }
}
