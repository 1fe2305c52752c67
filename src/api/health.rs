//! Health check endpoints

use std::sync::Arc;

use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use serde::Serialize;

use super::ApiState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Detailed readiness response
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub checks: ReadinessChecks,
}

/// Individual readiness checks
#[derive(Serialize)]
pub struct ReadinessChecks {
    pub dispatcher: CheckResult,
    pub voice: CheckResult,
}

/// Result of a single health check
#[derive(Serialize)]
pub struct CheckResult {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CheckResult {
    const fn ok() -> Self {
        Self {
            status: "ok",
            message: None,
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            status: "fail",
            message: Some(message.into()),
        }
    }

    fn unavailable() -> Self {
        Self {
            status: "unavailable",
            message: Some("not configured".to_string()),
        }
    }

    fn is_fail(&self) -> bool {
        self.status == "fail"
    }
}

/// Liveness probe - is the service running?
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness probe - can actions be dispatched?
async fn ready(State(state): State<Arc<ApiState>>) -> (StatusCode, Json<ReadinessResponse>) {
    let dispatcher = check_dispatcher(&state);
    // Voice is optional; a text-only deployment is still ready
    let voice = if state.services.voice_available() {
        CheckResult::ok()
    } else {
        CheckResult::unavailable()
    };

    let (status_code, status) = if dispatcher.is_fail() {
        (StatusCode::SERVICE_UNAVAILABLE, "fail")
    } else {
        (StatusCode::OK, "ok")
    };

    (
        status_code,
        Json(ReadinessResponse {
            status,
            checks: ReadinessChecks { dispatcher, voice },
        }),
    )
}

fn check_dispatcher(state: &ApiState) -> CheckResult {
    if state.services.dispatcher.registry().is_empty() {
        CheckResult::fail("no tools registered")
    } else {
        CheckResult::ok()
    }
}

/// Build health router (stateless)
pub fn router() -> Router {
    Router::new().route("/health", get(health))
}

/// Build readiness router (requires state)
pub fn ready_router(state: Arc<ApiState>) -> Router {
    Router::new().route("/ready", get(ready)).with_state(state)
}
