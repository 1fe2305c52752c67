//! Plugin discovery: scan directories for manifests

use std::path::{Path, PathBuf};

use super::manifest::{MANIFEST_FILE, PluginManifest};

/// Scan immediate subdirectories of each search path for a manifest
///
/// Missing directories and unparsable manifests are skipped with a log line.
#[must_use]
pub fn discover_plugins(dirs: &[PathBuf]) -> Vec<(PathBuf, PluginManifest)> {
    let mut results = Vec::new();

    for dir in dirs {
        let Ok(entries) = std::fs::read_dir(dir) else {
            tracing::debug!(path = %dir.display(), "plugin directory not readable, skipping");
            continue;
        };

        let mut paths: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        paths.sort();

        for path in paths {
            if let Some(manifest) = load_manifest(&path.join(MANIFEST_FILE)) {
                tracing::debug!(plugin_id = %manifest.id, path = %path.display(), "discovered plugin");
                results.push((path, manifest));
            }
        }
    }

    results
}

fn load_manifest(path: &Path) -> Option<PluginManifest> {
    let content = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&content)
        .map_err(|e| {
            tracing::warn!(path = %path.display(), error = %e, "failed to parse plugin manifest");
        })
        .ok()
}

/// `<config_dir>/cadence/plugins` and `<data_dir>/cadence/plugins`
#[must_use]
pub fn default_plugin_dirs() -> Vec<PathBuf> {
    let Some(base) = directories::BaseDirs::new() else {
        return Vec::new();
    };

    let mut dirs = vec![base.config_dir().join("cadence").join("plugins")];
    let data = base.data_dir().join("cadence").join("plugins");
    if !dirs.contains(&data) {
        dirs.push(data);
    }
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_plugin(root: &Path, dir: &str, manifest: &str) -> PathBuf {
        let plugin_dir = root.join(dir);
        std::fs::create_dir(&plugin_dir).unwrap();
        std::fs::write(plugin_dir.join(MANIFEST_FILE), manifest).unwrap();
        plugin_dir
    }

    #[test]
    fn discovers_valid_plugins_in_order() {
        let root = tempfile::tempdir().unwrap();
        write_plugin(root.path(), "b", r#"{"id":"b","name":"B","version":"1.0.0"}"#);
        let a = write_plugin(root.path(), "a", r#"{"id":"a","name":"A","version":"1.0.0"}"#);

        let results = discover_plugins(&[root.path().to_path_buf()]);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, a);
        assert_eq!(results[1].1.id, "b");
    }

    #[test]
    fn skips_invalid_manifest_and_missing_dirs() {
        let root = tempfile::tempdir().unwrap();
        write_plugin(root.path(), "bad", "not json");

        let results = discover_plugins(&[
            root.path().to_path_buf(),
            PathBuf::from("/nonexistent/cadence/plugins"),
        ]);
        assert!(results.is_empty());
    }
}
