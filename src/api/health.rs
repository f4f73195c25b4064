use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use serde_json::json;
use std::time::Instant;

use crate::state::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    timestamp: chrono::DateTime<chrono::Utc>,
    checks: HealthChecks,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    store: ComponentHealth,
}

/// Health status of a component
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ComponentHealth {
    fn healthy(latency_ms: u64) -> Self {
        Self {
            status: "healthy".to_string(),
            latency_ms: Some(latency_ms),
            error: None,
        }
    }

    fn unhealthy(error: String) -> Self {
        Self {
            status: "unhealthy".to_string(),
            latency_ms: None,
            error: Some(error),
        }
    }

    fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

async fn check_store(state: &AppState) -> ComponentHealth {
    let start = Instant::now();
    match state.repos.devices.ping().await {
        Ok(()) => ComponentHealth::healthy(start.elapsed().as_millis() as u64),
        Err(e) => ComponentHealth::unhealthy(e.to_string()),
    }
}

/// GET /healthz - process is up
pub async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// GET /health/ready - Readiness probe
///
/// Returns 503 while the device store is unreachable.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let store = check_store(&state).await;
    let ready = store.is_healthy();

    let response = HealthResponse {
        status: if ready { "ready" } else { "not_ready" }.to_string(),
        timestamp: chrono::Utc::now(),
        checks: HealthChecks { store },
    };
    tracing::debug!(ready, "readiness check completed");

    let status_code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(response))
}

/// GET /health/live - Liveness probe
pub async fn liveness_check() -> impl IntoResponse {
    Json(json!({
        "status": "alive",
        "timestamp": chrono::Utc::now(),
    }))
}
