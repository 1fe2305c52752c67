//! Plugin tools: dispatcher handlers backed by a subprocess

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use async_trait::async_trait;
use serde_json::Value;

use super::loader::PluginManager;
use super::manifest::PluginKind;
use crate::actions::{ActionRegistry, Meta, Params, ToolHandler, ToolInfo};

const PLUGIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs `<entry> <tool> <params_json>` in the plugin directory
#[derive(Debug, Clone)]
pub struct PluginTool {
    entry: PathBuf,
    tool: String,
    timeout: Duration,
}

impl PluginTool {
    #[must_use]
    pub fn new(entry: PathBuf, tool: impl Into<String>) -> Self {
        Self {
            entry,
            tool: tool.into(),
            timeout: PLUGIN_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ToolHandler for PluginTool {
    async fn call(&self, params: Params, _meta: Meta) -> anyhow::Result<Value> {
        let arguments = serde_json::to_string(&params)?;
        let stdout = run_entry(&self.entry, &self.tool, &arguments, self.timeout).await?;
        Ok(parse_output(&stdout))
    }
}

/// JSON if stdout parses as JSON, otherwise the trimmed text
fn parse_output(stdout: &str) -> Value {
    let trimmed = stdout.trim();
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}

/// Runtime is picked by extension: `.js`/`.ts` via bun, `.py` via python3,
/// anything else executed directly
fn command_for(entry: &Path) -> tokio::process::Command {
    let ext = entry.extension().and_then(|e| e.to_str()).unwrap_or("");
    let mut cmd = match ext {
        "js" | "ts" | "mjs" | "mts" => {
            let mut c = tokio::process::Command::new("bun");
            c.arg(entry);
            c
        }
        "py" => {
            let mut c = tokio::process::Command::new("python3");
            c.arg(entry);
            c
        }
        _ => tokio::process::Command::new(entry),
    };
    if let Some(parent) = entry.parent() {
        cmd.current_dir(parent);
    }
    cmd
}

async fn run_entry(
    entry: &Path,
    tool: &str,
    arguments: &str,
    timeout: Duration,
) -> anyhow::Result<String> {
    let mut cmd = command_for(entry);
    cmd.arg(tool)
        .arg(arguments)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd
        .spawn()
        .with_context(|| format!("failed to spawn plugin process {}", entry.display()))?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| anyhow::anyhow!("plugin execution timed out ({}s)", timeout.as_secs()))?
        .context("plugin process error")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("plugin exited with {}: {}", output.status, stderr.trim());
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Register every declared tool of every tool plugin that has an entry point
///
/// Returns the number of tools registered.
pub fn register_plugin_tools(manager: &PluginManager, registry: &ActionRegistry) -> usize {
    let mut count = 0;

    for plugin in manager.iter() {
        let manifest = &plugin.manifest;
        if manifest.kind != PluginKind::Tool {
            continue;
        }
        let Some(entry) = manifest.entry.as_deref() else {
            if !manifest.tools.is_empty() {
                tracing::warn!(plugin_id = %manifest.id, "plugin declares tools but has no entry point");
            }
            continue;
        };
        let entry = plugin.path.join(entry);

        for def in &manifest.tools {
            let mut info = ToolInfo::new(manifest.scoped_tool_name(&def.name), def.description.clone())
                .with_permissions(manifest.permissions.clone());
            if let Some(schema) = &def.input_schema {
                info = info.with_schema(schema.clone());
            }
            registry.register(info, Arc::new(PluginTool::new(entry.clone(), def.name.clone())));
            count += 1;
        }
    }

    if count > 0 {
        tracing::info!(count, "registered plugin tools");
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::manifest::MANIFEST_FILE;

    #[test]
    fn registers_scoped_names_with_permissions() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("lights");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(
            dir.join(MANIFEST_FILE),
            r#"{
                "id": "home.lights",
                "name": "Lights",
                "version": "1.0.0",
                "permissions": ["network"],
                "entry": "lights.py",
                "tools": [{"name": "on", "description": "Turn on", "input_schema": {"type": "object"}}]
            }"#,
        )
        .unwrap();

        let mut manager = PluginManager::new();
        manager.load_all(&[root.path().to_path_buf()]);
        let registry = ActionRegistry::new();

        assert_eq!(register_plugin_tools(&manager, &registry), 1);
        let info = registry.info("home.lights::on").unwrap();
        assert_eq!(info.description, "Turn on");
        assert_eq!(info.permissions, vec!["network"]);
        assert!(info.params_schema.is_some());
    }

    #[test]
    fn plugins_without_entry_register_nothing() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("p");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(
            dir.join(MANIFEST_FILE),
            r#"{"id":"p","name":"P","version":"1.0.0","tools":[{"name":"t"}]}"#,
        )
        .unwrap();

        let mut manager = PluginManager::new();
        manager.load_all(&[root.path().to_path_buf()]);
        let registry = ActionRegistry::new();
        assert_eq!(register_plugin_tools(&manager, &registry), 0);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn missing_entry_binary_is_an_error() {
        let tool = PluginTool::new(PathBuf::from("/nonexistent/cadence-plugin"), "t");
        let err = tool.call(Params::new(), None).await.unwrap_err();
        assert!(format!("{err:#}").contains("failed to spawn plugin process"));
    }

    #[test]
    fn output_is_json_or_text() {
        assert_eq!(parse_output("{\"on\": true}\n"), serde_json::json!({"on": true}));
        assert_eq!(parse_output("  lights on\n"), Value::String("lights on".to_string()));
    }
}
