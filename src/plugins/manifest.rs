//! Plugin manifest format (`cadence.plugin.json`)

use serde::{Deserialize, Serialize};

/// File name looked up in each plugin directory
pub const MANIFEST_FILE: &str = "cadence.plugin.json";

/// Metadata and declared tools of one plugin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Unique id, used as the tool name prefix (e.g. "home.lights")
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub kind: PluginKind,
    /// Advisory permissions copied onto every declared tool
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub tools: Vec<PluginToolDef>,
    /// Executable or script, relative to the plugin directory
    #[serde(default)]
    pub entry: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PluginKind {
    /// Exposes actions to the dispatcher
    #[default]
    Tool,
    /// Loaded and listed, but registers nothing
    Service,
}

/// Tool declared by a plugin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginToolDef {
    /// Name within the plugin; registered as `<plugin_id>::<name>`
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input_schema: Option<serde_json::Value>,
}

impl PluginManifest {
    /// Registry name of one of this plugin's tools
    #[must_use]
    pub fn scoped_tool_name(&self, tool: &str) -> String {
        format!("{}::{tool}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_manifest() {
        let json = r#"{
            "id": "home.lights",
            "name": "Lights",
            "version": "1.0.0",
            "description": "Switch lights on and off",
            "kind": "tool",
            "permissions": ["network"],
            "tools": [
                {
                    "name": "toggle",
                    "description": "Toggle a room",
                    "input_schema": {
                        "type": "object",
                        "properties": { "room": { "type": "string" } }
                    }
                }
            ],
            "entry": "lights.py"
        }"#;

        let manifest: PluginManifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.kind, PluginKind::Tool);
        assert_eq!(manifest.tools[0].name, "toggle");
        assert_eq!(manifest.scoped_tool_name("toggle"), "home.lights::toggle");
        assert_eq!(manifest.permissions, vec!["network"]);
    }

    #[test]
    fn minimal_manifest_defaults_to_tool_kind() {
        let json = r#"{"id": "x", "name": "X", "version": "0.1.0"}"#;
        let manifest: PluginManifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.kind, PluginKind::Tool);
        assert!(manifest.tools.is_empty());
        assert!(manifest.entry.is_none());
    }
}
