//! Plugin tools
//!
//! Plugins are discovered from `cadence.plugin.json` manifests in the
//! configured plugin directories. Each tool a plugin declares becomes a
//! dispatcher action named `<plugin_id>::<tool>`, executed as a subprocess.

mod discovery;
mod loader;
mod manifest;
mod tool;

pub use discovery::{default_plugin_dirs, discover_plugins};
pub use loader::{LoadedPlugin, PluginManager, PluginSummary};
pub use manifest::{MANIFEST_FILE, PluginKind, PluginManifest, PluginToolDef};
pub use tool::{PluginTool, register_plugin_tools};
