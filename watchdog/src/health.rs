//! `GET /api/health` and `GET /internal/keepalive`, served directly by this
//! process (never rewritten — both paths bypass the gateway).

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use store::{keys, SandboxState, StateStore};

use crate::config::monitoring_routes_disabled;

pub struct HealthState<S> {
    pub store: std::sync::Arc<S>,
    pub started_at: Instant,
    pub keepalive_token: String,
    pub self_url_is_set: bool,
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    service: &'static str,
    #[serde(rename = "sandboxOrigin")]
    sandbox_origin: Option<String>,
    env: &'static str,
    #[serde(rename = "uptimeSeconds")]
    uptime_seconds: u64,
    timestamp: DateTime<Utc>,
    #[serde(rename = "watchdogLastCheckAt")]
    watchdog_last_check_at: Option<DateTime<Utc>>,
    #[serde(rename = "watchdogLastRotationAt")]
    watchdog_last_rotation_at: Option<DateTime<Utc>>,
}

pub async fn api_health<S: StateStore>(
    State(state): State<Arc<HealthState<S>>>,
    headers: HeaderMap,
) -> Response {
    if monitoring_routes_disabled() {
        return StatusCode::NOT_FOUND.into_response();
    }

    let sandbox_origin = headers
        .get("x-sandbox-origin")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let env = if sandbox_origin.is_some() || state.self_url_is_set {
        "sandbox"
    } else {
        "router"
    };

    let persisted = state
        .store
        .read_first(&keys::state_fallbacks())
        .await
        .ok()
        .flatten()
        .and_then(|v| serde_json::from_value::<SandboxState>(v).ok());

    let body = HealthBody {
        status: "ok",
        service: "next-app",
        sandbox_origin,
        env,
        uptime_seconds: state.started_at.elapsed().as_secs(),
        timestamp: Utc::now(),
        watchdog_last_check_at: persisted.as_ref().and_then(|s| s.last_check_at),
        watchdog_last_rotation_at: persisted.as_ref().and_then(|s| s.last_rotation_at),
    };

    Json(body).into_response()
}

pub async fn internal_keepalive<S: StateStore>(
    State(state): State<Arc<HealthState<S>>>,
    headers: HeaderMap,
) -> Response {
    let presented = headers
        .get("x-keepalive-token")
        .and_then(|v| v.to_str().ok());

    let response = if presented == Some(state.keepalive_token.as_str()) {
        (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "detail": "keepalive accepted",
                "timestamp": Utc::now(),
            })),
        )
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "status": "unauthorized",
                "detail": "missing or incorrect x-keepalive-token",
                "timestamp": Utc::now(),
            })),
        )
    };

    ([("cache-control", "no-store")], response).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_body_serializes_camel_case_optional_fields() {
        let body = HealthBody {
            status: "ok",
            service: "next-app",
            sandbox_origin: None,
            env: "router",
            uptime_seconds: 42,
            timestamp: Utc::now(),
            watchdog_last_check_at: None,
            watchdog_last_rotation_at: None,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["sandboxOrigin"], serde_json::Value::Null);
        assert_eq!(value["watchdogLastCheckAt"], serde_json::Value::Null);
        assert_eq!(value["uptimeSeconds"], 42);
    }
}
