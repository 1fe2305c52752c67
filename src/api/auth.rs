//! Access guard for the developer endpoints

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use super::{ApiError, ApiState};

/// Bearer token from the `Authorization` header
fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Check a request against the configured key and developer mode
///
/// A configured key is checked first, so a caller without credentials
/// learns nothing about whether developer mode is on.
fn check_developer_access(state: &ApiState, req: &Request) -> Result<(), ApiError> {
    if let Some(expected) = &state.api_key {
        match bearer_token(req) {
            Some(token) if token == expected => {}
            Some(_) => {
                tracing::warn!(path = %req.uri().path(), "developer request with wrong API key");
                return Err(ApiError::Unauthorized("invalid API key"));
            }
            None => {
                tracing::debug!(path = %req.uri().path(), "developer request without API key");
                return Err(ApiError::Unauthorized("missing API key"));
            }
        }
    }

    if !state.developer_mode {
        return Err(ApiError::Forbidden("tool registration requires developer mode"));
    }

    Ok(())
}

/// Middleware for routes that change the running gateway
pub async fn require_developer(
    State(state): State<Arc<ApiState>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    check_developer_access(&state, &req)?;
    Ok(next.run(req).await)
}
