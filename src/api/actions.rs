//! Action, job, tool and session endpoints

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{ApiError, ApiState, auth};
use crate::actions::{Action, AsyncAccepted};
use crate::conversation::TurnState;
use crate::tools::EchoTool;

pub fn router(state: Arc<ApiState>) -> Router {
    let protected = Router::new()
        .route("/tools/register", post(register_tool))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_developer,
        ));

    Router::new()
        .route("/actions", post(submit_action))
        .route("/jobs/{job_id}", get(job_status))
        .route("/tools", get(tools))
        .route("/plugins", get(plugins))
        .route("/sessions/{session_id}/state", get(session_state))
        .merge(protected)
        .with_state(state)
}

/// Run an action inline, or accept it as a background job
async fn submit_action(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<Action>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(action) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let dispatcher = &state.services.dispatcher;

    if !dispatcher.is_valid_action(&action.kind) {
        tracing::debug!(action_id = %action.id, kind = %action.kind, "rejected unknown action");
        return Err(ApiError::InvalidAction(format!(
            "Unknown action type: {}",
            action.kind
        )));
    }

    if action.run_async {
        let action_id = action.id.clone();
        let job_id = dispatcher.execute_async(action).await;
        let accepted = AsyncAccepted::new(job_id, action_id);
        return Ok((StatusCode::ACCEPTED, Json(accepted)).into_response());
    }

    let result = dispatcher.execute_sync(&action).await;
    Ok(Json(result).into_response())
}

async fn job_status(
    State(state): State<Arc<ApiState>>,
    Path(job_id): Path<String>,
) -> Result<Response, ApiError> {
    state
        .services
        .dispatcher
        .get_job_status(&job_id)
        .await
        .map(|job| Json(job).into_response())
        .ok_or_else(|| ApiError::NotFound(format!("job {job_id} not found")))
}

#[derive(Debug, Deserialize)]
struct ToolsQuery {
    name: Option<String>,
}

/// List tool names, or describe one with `?name=`
async fn tools(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<ToolsQuery>,
) -> Result<Response, ApiError> {
    let registry = state.services.dispatcher.registry();

    match query.name {
        Some(name) => registry
            .info(&name)
            .map(|info| Json(info).into_response())
            .ok_or_else(|| ApiError::NotFound(format!("tool {name} not found"))),
        None => Ok(Json(json!({ "tools": registry.names() })).into_response()),
    }
}

#[derive(Debug, Deserialize)]
struct RegisterToolRequest {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default = "default_tool_kind")]
    kind: String,
}

fn default_tool_kind() -> String {
    "echo".to_string()
}

#[derive(Debug, Serialize)]
struct RegisterToolResponse {
    status: &'static str,
    name: String,
}

/// Register a dynamic tool at runtime (guarded by [`auth::require_developer`])
async fn register_tool(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<RegisterToolRequest>, JsonRejection>,
) -> Result<Json<RegisterToolResponse>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let name = request.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("tool name must not be empty".to_string()));
    }
    if request.kind != "echo" {
        return Err(ApiError::BadRequest(format!(
            "unsupported tool kind: {}",
            request.kind
        )));
    }

    let description = request
        .description
        .unwrap_or_else(|| "Dynamically registered echo tool".to_string());
    state
        .services
        .dispatcher
        .register_tool(EchoTool::info(name, &description), Arc::new(EchoTool));
    tracing::info!(tool = %name, "registered dynamic tool");

    Ok(Json(RegisterToolResponse {
        status: "registered",
        name: name.to_string(),
    }))
}

async fn plugins(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(json!({ "plugins": state.plugins.summaries() }))
}

#[derive(Debug, Serialize)]
struct SessionStateResponse {
    session_id: String,
    state: TurnState,
    previous_state: Option<TurnState>,
    is_speaking: bool,
    is_listening: bool,
    is_interrupted: bool,
}

async fn session_state(
    State(state): State<Arc<ApiState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionStateResponse>, ApiError> {
    let machine = state
        .services
        .sessions
        .get(&session_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("session {session_id} not found")))?;

    Ok(Json(SessionStateResponse {
        session_id,
        state: machine.get_state(),
        previous_state: machine.previous_state(),
        is_speaking: machine.is_speaking(),
        is_listening: machine.is_listening(),
        is_interrupted: machine.is_interrupted(),
    }))
}
