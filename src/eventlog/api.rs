//! HTTP endpoint receiving events from telemetry clients

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::put,
};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use super::recorder::{EventLog, RecordError};
use crate::telemetry::handler::{EVENTLOG_PATH, join_url};

const REQUIRED_FIELDS: [&str; 3] = ["schema", "version", "event"];

#[derive(Clone)]
pub struct AppState {
    eventlog: Arc<EventLog>,
    token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(eventlog: EventLog, token: Option<String>) -> Self {
        Self {
            eventlog: Arc::new(eventlog),
            token: token.map(Arc::from),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing or invalid token")]
    Forbidden,

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error("Event recording failed: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match self {
            Self::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Self::Record(RecordError::NotRegistered { .. }) => (StatusCode::BAD_REQUEST, "schema_not_registered"),
            Self::Record(RecordError::Invalid { .. }) => (StatusCode::BAD_REQUEST, "invalid_event"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        let body = serde_json::json!({"error": kind, "message": self.to_string()});
        (status, Json(body)).into_response()
    }
}

/// Path the endpoint is served at under `base_url` (always absolute)
pub fn eventlog_route(base_url: &str) -> String {
    join_url(&format!("/{}", base_url.trim_matches('/')), EVENTLOG_PATH)
}

/// Build the receiver router
pub fn create_router(state: AppState, base_url: &str) -> Router {
    let route = eventlog_route(base_url);
    log::info!("Event log endpoint mounted at {}", route);

    Router::new().route(&route, put(put_event)).with_state(state)
}

fn authorized(expected: &str, headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("token ").or_else(|| v.strip_prefix("Bearer ")))
        .is_some_and(|t| t.trim() == expected)
}

async fn put_event(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<StatusCode, ApiError> {
    if let Some(ref token) = state.token
        && !authorized(token, &headers)
    {
        return Err(ApiError::Forbidden);
    }

    let raw: Value = serde_json::from_slice(body.trim_ascii()).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    for field in REQUIRED_FIELDS {
        if raw.get(field).is_none() {
            return Err(ApiError::BadRequest(format!("{} is a required field", field)));
        }
    }

    let schema = raw["schema"]
        .as_str()
        .ok_or_else(|| ApiError::BadRequest("schema must be a string".to_string()))?
        .to_string();
    let version = raw["version"]
        .as_u64()
        .ok_or_else(|| ApiError::BadRequest("version must be a non-negative integer".to_string()))?;

    // Sinks write with blocking file I/O
    let eventlog = Arc::clone(&state.eventlog);
    tokio::task::spawn_blocking(move || eventlog.record_event(&schema, version, &raw["event"]))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    Ok(StatusCode::NO_CONTENT)
}
