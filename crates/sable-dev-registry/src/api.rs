//! Consul-compatible HTTP handlers.
//!
//! Only the subset the Sable clients speak is served:
//!
//! | Route | Answer |
//! |---|---|
//! | `GET /v1/kv/*key` | entries (`?recurse`, blocking with `?index=&wait=`), `404` when empty |
//! | `PUT /v1/kv/*key` | stores the raw body, answers `true` |
//! | `DELETE /v1/kv/*key` | removes the key (`?recurse` for a prefix), answers `true` |
//! | `PUT /v1/agent/service/register` | adds or replaces an instance |
//! | `PUT /v1/agent/service/deregister/:id` | removes an instance, `404` if unknown |
//! | `GET /v1/agent/services` | every instance by id |
//!
//! Every key/value answer carries `X-Consul-Index`.

use crate::storage::{DevRegistry, DEFAULT_WAIT};
use axum::{
    body::Bytes,
    extract::{Path, Query, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use sable_common::serde_ext::parse_duration;
use sable_registry::wire::{AgentServiceRegistration, KvEntry, INDEX_HEADER, TOKEN_HEADER};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Shared state of the handlers.
#[derive(Debug, Clone)]
pub struct ApiState {
    pub registry: Arc<DevRegistry>,
    /// When set, every request must carry it in `X-Consul-Token`.
    pub token: Option<String>,
}

pub fn create_router(registry: Arc<DevRegistry>, token: Option<String>) -> Router {
    let state = ApiState { registry, token };

    Router::new()
        .route("/v1/kv/*key", get(kv_get_handler).put(kv_put_handler).delete(kv_delete_handler))
        .route("/v1/agent/service/register", put(register_handler))
        .route("/v1/agent/service/deregister/:id", put(deregister_handler))
        .route("/v1/agent/services", get(services_handler))
        .layer(middleware::from_fn_with_state(state.clone(), require_token))
        .with_state(state)
}

/// Query string of the key/value routes.
#[derive(Debug, Default, Deserialize)]
pub struct KvQuery {
    /// Consul sends a bare `?recurse`; `recurse=true` is accepted too.
    pub recurse: Option<String>,
    pub index: Option<u64>,
    pub wait: Option<String>,
}

impl KvQuery {
    fn recurse(&self) -> bool {
        self.recurse.as_deref().map_or(false, |v| !v.eq_ignore_ascii_case("false"))
    }
}

async fn require_token(State(state): State<ApiState>, request: Request, next: Next) -> Response {
    if let Some(expected) = &state.token {
        let presented = request.headers().get(TOKEN_HEADER).and_then(|v| v.to_str().ok());
        if presented != Some(expected.as_str()) {
            warn!(path = %request.uri().path(), "Rejected request without a valid token");
            return ApiError::Forbidden("Permission denied".to_string()).into_response();
        }
    }
    next.run(request).await
}

async fn kv_get_handler(
    State(state): State<ApiState>,
    Path(key): Path<String>,
    Query(query): Query<KvQuery>,
) -> Result<Response, ApiError> {
    let recurse = query.recurse();
    let (index, entries) = match query.index.filter(|i| *i > 0) {
        Some(wait_index) => {
            let wait = match query.wait.as_deref() {
                Some(text) => parse_duration(text).map_err(ApiError::BadRequest)?,
                None => DEFAULT_WAIT,
            };
            debug!("Blocking read of '{}' past index {} for {:?}", key, wait_index, wait);
            state.registry.read_blocking(&key, recurse, wait_index, wait).await
        }
        None => state.registry.read(&key, recurse),
    };

    let mut response = if entries.is_empty() {
        StatusCode::NOT_FOUND.into_response()
    } else {
        Json::<Vec<KvEntry>>(entries).into_response()
    };
    response.headers_mut().insert(INDEX_HEADER, HeaderValue::from(index));
    Ok(response)
}

async fn kv_put_handler(State(state): State<ApiState>, Path(key): Path<String>, body: Bytes) -> Response {
    let index = state.registry.put(key, Some(body.to_vec()));
    with_index(Json(true), index)
}

async fn kv_delete_handler(
    State(state): State<ApiState>,
    Path(key): Path<String>,
    Query(query): Query<KvQuery>,
) -> Response {
    state.registry.delete(&key, query.recurse());
    with_index(Json(true), state.registry.index())
}

async fn register_handler(State(state): State<ApiState>, Json(registration): Json<AgentServiceRegistration>) -> Result<StatusCode, ApiError> {
    if registration.id.is_empty() || registration.name.is_empty() {
        return Err(ApiError::BadRequest("Missing service ID or name".to_string()));
    }
    info!("Registering service: {} ({})", registration.id, registration.name);
    state.registry.register(registration);
    Ok(StatusCode::OK)
}

async fn deregister_handler(State(state): State<ApiState>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    if !state.registry.deregister(&id) {
        return Err(ApiError::NotFound(format!("Unknown service ID {:?}", id)));
    }
    Ok(StatusCode::OK)
}

async fn services_handler(State(state): State<ApiState>) -> Json<BTreeMap<String, AgentServiceRegistration>> {
    Json(state.registry.services())
}

fn with_index(body: impl IntoResponse, index: u64) -> Response {
    let mut response = body.into_response();
    response.headers_mut().insert(INDEX_HEADER, HeaderValue::from(index));
    response
}

/// Error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// API error type.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Forbidden(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
        };

        error!("API error: {} - {}", status, message);

        let body = Json(ErrorResponse { error: message });
        (status, body).into_response()
    }
}
