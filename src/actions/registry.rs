//! Action registry: name to handler plus descriptive metadata

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::types::{Meta, Params};

/// Implements one action type
///
/// Failures are plain `anyhow` errors; their message becomes the `error`
/// field of the action result.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Run the action
    ///
    /// # Errors
    ///
    /// Any error is reported to the caller as a structured failure
    async fn call(&self, params: Params, meta: Meta) -> anyhow::Result<Value>;
}

/// Adapter turning an async closure into a [`ToolHandler`]
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(Params, Meta) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn call(&self, params: Params, meta: Meta) -> anyhow::Result<Value> {
        (self.0)(params, meta).await
    }
}

/// Wrap an async closure as a shareable handler
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn ToolHandler>
where
    F: Fn(Params, Meta) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Descriptive metadata for a registered tool
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params_schema: Option<Value>,
    pub permissions: Vec<String>,
}

impl ToolInfo {
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params_schema: None,
            permissions: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.params_schema = Some(schema);
        self
    }

    #[must_use]
    pub fn with_permissions(mut self, permissions: Vec<String>) -> Self {
        self.permissions = permissions;
        self
    }
}

struct RegisteredTool {
    info: ToolInfo,
    handler: Arc<dyn ToolHandler>,
}

/// Map from action type name to handler
#[derive(Default)]
pub struct ActionRegistry {
    tools: RwLock<HashMap<String, RegisteredTool>>,
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl ActionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; the last registration for a name wins
    ///
    /// Returns true if an existing handler was replaced.
    pub fn register(&self, info: ToolInfo, handler: Arc<dyn ToolHandler>) -> bool {
        let name = info.name.clone();
        let replaced = self
            .tools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), RegisteredTool { info, handler })
            .is_some();

        if replaced {
            tracing::warn!(tool = %name, "overwriting existing tool registration");
        } else {
            tracing::debug!(tool = %name, "registered tool");
        }
        replaced
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.tools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    #[must_use]
    pub fn handler(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|tool| Arc::clone(&tool.handler))
    }

    #[must_use]
    pub fn info(&self, name: &str) -> Option<ToolInfo> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|tool| tool.info.clone())
    }

    /// Registered names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Metadata for every tool, sorted by name
    #[must_use]
    pub fn list(&self) -> Vec<ToolInfo> {
        let mut infos: Vec<ToolInfo> = self
            .tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|tool| tool.info.clone())
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn constant(value: Value) -> Arc<dyn ToolHandler> {
        handler_fn(move |_params, _meta| {
            let value = value.clone();
            async move { Ok(value) }
        })
    }

    #[tokio::test]
    async fn last_registration_wins() {
        let registry = ActionRegistry::new();
        assert!(!registry.register(ToolInfo::new("t", "first"), constant(json!(1))));
        assert!(registry.register(ToolInfo::new("t", "second"), constant(json!(2))));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.info("t").unwrap().description, "second");
        let handler = registry.handler("t").unwrap();
        assert_eq!(handler.call(Params::new(), None).await.unwrap(), json!(2));
    }

    #[test]
    fn names_are_sorted() {
        let registry = ActionRegistry::new();
        registry.register(ToolInfo::new("b.tool", ""), constant(Value::Null));
        registry.register(ToolInfo::new("a.tool", ""), constant(Value::Null));
        assert_eq!(registry.names(), vec!["a.tool", "b.tool"]);
        assert_eq!(registry.list()[0].name, "a.tool");
    }

    #[test]
    fn info_carries_schema_and_permissions() {
        let registry = ActionRegistry::new();
        registry.register(
            ToolInfo::new("calendar.add", "Add an event")
                .with_schema(json!({"type": "object"}))
                .with_permissions(vec!["calendar".to_string()]),
            constant(Value::Null),
        );

        let info = serde_json::to_value(registry.info("calendar.add").unwrap()).unwrap();
        assert_eq!(info["params_schema"]["type"], "object");
        assert_eq!(info["permissions"], json!(["calendar"]));
    }

    #[test]
    fn unregister_removes_tool() {
        let registry = ActionRegistry::new();
        registry.register(ToolInfo::new("t", ""), constant(Value::Null));
        assert!(registry.unregister("t"));
        assert!(!registry.contains("t"));
        assert!(registry.is_empty());
    }
}
