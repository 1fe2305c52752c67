//! Loaded plugin set

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use super::discovery::discover_plugins;
use super::manifest::{PluginKind, PluginManifest};

/// A discovered plugin and where it lives
#[derive(Debug, Clone)]
pub struct LoadedPlugin {
    pub manifest: PluginManifest,
    pub path: PathBuf,
}

/// Listing entry for `GET /v1/plugins`
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PluginSummary {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub kind: PluginKind,
    /// Scoped registry names
    pub tools: Vec<String>,
    pub path: String,
}

impl fmt::Display for PluginSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({}) - {} tool(s) at {}",
            self.id,
            self.version,
            self.name,
            self.tools.len(),
            self.path
        )
    }
}

/// Plugins keyed by id; the first manifest seen for an id wins
#[derive(Debug, Default)]
pub struct PluginManager {
    plugins: BTreeMap<String, LoadedPlugin>,
}

impl PluginManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Discover and load plugins, returning the ids loaded by this call
    pub fn load_all(&mut self, dirs: &[PathBuf]) -> Vec<String> {
        let mut loaded = Vec::new();

        for (path, manifest) in discover_plugins(dirs) {
            if self.plugins.contains_key(&manifest.id) {
                tracing::debug!(plugin_id = %manifest.id, path = %path.display(), "duplicate plugin id, skipping");
                continue;
            }

            tracing::info!(
                plugin_id = %manifest.id,
                version = %manifest.version,
                tools = manifest.tools.len(),
                "loaded plugin"
            );
            loaded.push(manifest.id.clone());
            self.plugins
                .insert(manifest.id.clone(), LoadedPlugin { manifest, path });
        }

        loaded
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&LoadedPlugin> {
        self.plugins.get(id)
    }

    /// Plugins sorted by id
    pub fn iter(&self) -> impl Iterator<Item = &LoadedPlugin> {
        self.plugins.values()
    }

    #[must_use]
    pub fn summaries(&self) -> Vec<PluginSummary> {
        self.iter()
            .map(|p| PluginSummary {
                id: p.manifest.id.clone(),
                name: p.manifest.name.clone(),
                version: p.manifest.version.clone(),
                description: p.manifest.description.clone(),
                kind: p.manifest.kind,
                tools: p
                    .manifest
                    .tools
                    .iter()
                    .map(|t| p.manifest.scoped_tool_name(&t.name))
                    .collect(),
                path: p.path.display().to_string(),
            })
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}
