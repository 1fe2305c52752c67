//! Built-in tools available in every deployment

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};

use crate::actions::{ActionRegistry, Meta, Params, ToolHandler, ToolInfo};

/// Returns its input unchanged, wrapped with the caller metadata
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoTool;

#[async_trait]
impl ToolHandler for EchoTool {
    async fn call(&self, params: Params, meta: Meta) -> anyhow::Result<Value> {
        Ok(json!({ "params": params, "meta": meta }))
    }
}

impl EchoTool {
    /// Registry metadata for an echo tool under `name`
    #[must_use]
    pub fn info(name: &str, description: &str) -> ToolInfo {
        ToolInfo::new(name, description).with_schema(json!({
            "type": "object",
            "additionalProperties": true
        }))
    }
}

/// Current time as RFC 3339 UTC and unix seconds
#[derive(Debug, Clone, Copy, Default)]
pub struct ClockTool;

#[async_trait]
impl ToolHandler for ClockTool {
    async fn call(&self, _params: Params, _meta: Meta) -> anyhow::Result<Value> {
        let now = Utc::now();
        Ok(json!({
            "iso": now.to_rfc3339(),
            "unix": now.timestamp(),
        }))
    }
}

/// Register `echo` and `time.now`
pub fn register_builtin_tools(registry: &ActionRegistry) {
    registry.register(
        EchoTool::info("echo", "Echo the given parameters back"),
        Arc::new(EchoTool),
    );
    registry.register(
        ToolInfo::new("time.now", "Current date and time in UTC"),
        Arc::new(ClockTool),
    );
    tracing::debug!(count = registry.len(), "registered built-in tools");
}
