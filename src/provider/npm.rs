use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::warn;

use super::{executable, manifest_dir, process, project_name, read_manifest, require_lock_file, Provider};
use crate::config::Config;
use crate::error::ProviderError;
use crate::graph::DependencyGraph;
use crate::models::{Content, Ecosystem, Package};
use crate::sbom;

const LOCK_FILE: &str = "package-lock.json";

/// Provider for npm projects (`package.json`).
///
/// Requires `package-lock.json` next to the manifest. Component analysis
/// pins the declared `dependencies` from the lock file; stack analysis runs
/// `npm ls --all` against the lock file only, so `node_modules` is never
/// consulted. Dev dependencies are excluded from both.
pub struct NpmProvider {
    manifest: PathBuf,
    config: Config,
}

impl NpmProvider {
    pub fn new(manifest: PathBuf, config: Config) -> Self {
        Self { manifest, config }
    }

    fn load_manifest(&self) -> Result<Value, ProviderError> {
        let content = read_manifest(&self.manifest)?;
        serde_json::from_str(&content).map_err(|e| ProviderError::manifest(&self.manifest, e))
    }

    fn root(&self, manifest: &Value) -> Package {
        let name = manifest
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| project_name(&self.manifest));
        let version = manifest
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or("0.0.0");
        Package::npm(&name, version)
    }
}

impl Provider for NpmProvider {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Npm
    }

    fn manifest(&self) -> &Path {
        &self.manifest
    }

    fn provide_stack(&self) -> Result<Content, ProviderError> {
        let manifest = self.load_manifest()?;
        let dir = manifest_dir(&self.manifest);
        self.validate_lock_file(dir)?;
        let npm = self.executable("npm")?;

        let captured = process::capture(
            &npm,
            ["ls", "--all", "--omit=dev", "--package-lock-only", "--json"],
            dir,
        )?;
        // `npm ls` exits non-zero on peer/extraneous problems but still prints the tree.
        let tree: Value = match serde_json::from_str(&captured.stdout) {
            Ok(tree) => tree,
            Err(_) if !captured.success => return Err(captured.failure()),
            Err(e) => return Err(ProviderError::tool(captured.label.as_str(), e)),
        };
        if !captured.success {
            if tree.get("error").is_some() {
                return Err(captured.failure());
            }
            warn!(command = %captured.label, "npm ls reported problems, using its tree anyway");
        }

        let graph = graph_from_npm_ls(&tree, self.root(&manifest));
        sbom::to_content(&graph)
    }

    fn provide_component(&self) -> Result<Content, ProviderError> {
        let manifest = self.load_manifest()?;
        let lock_path = require_lock_file(manifest_dir(&self.manifest), LOCK_FILE)?;
        let lock: Value = std::fs::read_to_string(&lock_path)
            .map_err(|e| ProviderError::manifest(&lock_path, e))
            .and_then(|s| serde_json::from_str(&s).map_err(|e| ProviderError::manifest(&lock_path, e)))?;

        let mut graph = DependencyGraph::new(self.root(&manifest));
        if let Some(deps) = manifest.get("dependencies").and_then(Value::as_object) {
            for name in deps.keys() {
                let version = locked_version(&lock, name).ok_or_else(|| ProviderError::Unresolved {
                    package: name.clone(),
                    reason: format!("not present in {}", LOCK_FILE),
                })?;
                graph.add_direct(Package::npm(name, &version));
            }
        }
        sbom::to_content(&graph)
    }

    fn validate_lock_file(&self, lock_file_dir: &Path) -> Result<(), ProviderError> {
        require_lock_file(lock_file_dir, LOCK_FILE).map(|_| ())
    }

    fn executable(&self, command: &str) -> Result<PathBuf, ProviderError> {
        executable::resolve(&self.config, command, &[])
    }
}

/// Version pinned for a top-level package, from a v2/v3 `packages` map or a
/// v1 `dependencies` map.
fn locked_version(lock: &Value, name: &str) -> Option<String> {
    lock.get("packages")
        .and_then(|p| p.get(format!("node_modules/{}", name)))
        .and_then(|entry| entry.get("version"))
        .and_then(Value::as_str)
        .or_else(|| {
            lock.get("dependencies")
                .and_then(|d| d.get(name))
                .and_then(|entry| entry.get("version"))
                .and_then(Value::as_str)
        })
        .map(str::to_string)
}

/// Build the graph from `npm ls --all --json` output.
///
/// Entries without a `version` (missing optional packages) are skipped.
fn graph_from_npm_ls(tree: &Value, fallback_root: Package) -> DependencyGraph {
    let name = tree.get("name").and_then(Value::as_str);
    let version = tree.get("version").and_then(Value::as_str);
    let root = match (name, version) {
        (Some(name), Some(version)) => Package::npm(name, version),
        _ => fallback_root,
    };

    let mut graph = DependencyGraph::new(root.clone());
    add_children(&mut graph, &root, tree);
    graph
}

fn add_children(graph: &mut DependencyGraph, parent: &Package, node: &Value) {
    let Some(deps) = node.get("dependencies").and_then(Value::as_object) else {
        return;
    };
    for (name, child) in deps {
        let Some(version) = child.get("version").and_then(Value::as_str) else {
            continue;
        };
        let pkg = Package::npm(name, version);
        graph.add(parent, pkg.clone());
        add_children(graph, &pkg, child);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PACKAGE_JSON: &str = r#"{
  "name": "my-app",
  "version": "1.0.0",
  "dependencies": {
    "express": "^4.18.2",
    "@types/node": "^20.0.0"
  },
  "devDependencies": {
    "jest": "^29.0.0"
  }
}"#;

    const LOCK_V3: &str = r#"{
  "name": "my-app",
  "lockfileVersion": 3,
  "packages": {
    "": { "name": "my-app", "version": "1.0.0" },
    "node_modules/express": { "version": "4.18.2" },
    "node_modules/@types/node": { "version": "20.1.0" },
    "node_modules/body-parser": { "version": "1.20.1" },
    "node_modules/jest": { "version": "29.7.0", "dev": true }
  }
}"#;

    fn project(lock: Option<&str>) -> (TempDir, NpmProvider) {
        let dir = TempDir::new().unwrap();
        let manifest = dir.path().join("package.json");
        std::fs::write(&manifest, PACKAGE_JSON).unwrap();
        if let Some(lock) = lock {
            std::fs::write(dir.path().join(LOCK_FILE), lock).unwrap();
        }
        (dir, NpmProvider::new(manifest, Config::default()))
    }

    #[test]
    fn test_component_lists_declared_dependencies() {
        let (_dir, provider) = project(Some(LOCK_V3));
        let content = provider.provide_component().unwrap();
        let json: Value = serde_json::from_slice(content.buffer()).unwrap();

        let mut purls: Vec<&str> = json["components"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["purl"].as_str().unwrap())
            .collect();
        purls.sort();
        assert_eq!(purls, vec!["pkg:npm/%40types/node@20.1.0", "pkg:npm/express@4.18.2"]);
        assert_eq!(json["metadata"]["component"]["purl"], "pkg:npm/my-app@1.0.0");
    }

    #[test]
    fn test_lock_file_required() {
        let (dir, provider) = project(None);
        match provider.validate_lock_file(dir.path()).unwrap_err() {
            ProviderError::LockFileMissing { lock_file, .. } => assert_eq!(lock_file, LOCK_FILE),
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(
            provider.provide_component(),
            Err(ProviderError::LockFileMissing { .. })
        ));
        assert!(matches!(
            provider.provide_stack(),
            Err(ProviderError::LockFileMissing { .. })
        ));

        std::fs::write(dir.path().join(LOCK_FILE), LOCK_V3).unwrap();
        assert!(provider.validate_lock_file(dir.path()).is_ok());
    }

    #[test]
    fn test_unlocked_dependency_is_unresolved() {
        let lock = r#"{ "lockfileVersion": 3, "packages": { "node_modules/express": { "version": "4.18.2" } } }"#;
        let (_dir, provider) = project(Some(lock));
        let err = provider.provide_component().unwrap_err();
        assert!(matches!(err, ProviderError::Unresolved { ref package, .. } if package == "@types/node"));
    }

    #[test]
    fn test_locked_version_v1() {
        let lock: Value = serde_json::from_str(
            r#"{ "lockfileVersion": 1, "dependencies": { "lodash": { "version": "4.17.21" } } }"#,
        )
        .unwrap();
        assert_eq!(locked_version(&lock, "lodash").as_deref(), Some("4.17.21"));
        assert_eq!(locked_version(&lock, "express"), None);
    }

    #[test]
    fn test_graph_from_npm_ls() {
        let tree: Value = serde_json::from_str(
            r#"{
  "name": "my-app",
  "version": "1.0.0",
  "dependencies": {
    "a": { "version": "1.0.0" },
    "b": {
      "version": "2.0.0",
      "dependencies": {
        "c": { "version": "3.0.0" },
        "a": { "version": "1.0.0" },
        "gone": { "missing": true }
      }
    }
  }
}"#,
        )
        .unwrap();

        let graph = graph_from_npm_ls(&tree, Package::npm("fallback", "0.0.0"));
        assert_eq!(graph.root().name, "my-app");
        let direct: Vec<&str> = graph.direct().map(|p| p.name.as_str()).collect();
        assert_eq!(direct, vec!["a", "b"]);
        let all: Vec<&str> = graph.packages().into_iter().map(|p| p.name.as_str()).collect();
        assert_eq!(all, vec!["a", "b", "c"]);
    }
}

#[cfg(all(test, unix))]
mod tool_tests {
    use super::*;
    use crate::provider::testing::{fake_tool, purls, relative_to_cwd};
    use tempfile::TempDir;

    const NPM: &str = r#"#!/bin/sh
[ -f package-lock.json ] || { echo "no lock in $(pwd)" >&2; exit 1; }
cat <<'TREE'
{
  "name": "my-app",
  "version": "1.0.0",
  "dependencies": {
    "express": {
      "version": "4.18.2",
      "dependencies": { "body-parser": { "version": "1.20.1" } }
    },
    "@types/node": { "version": "20.1.0" }
  }
}
TREE
"#;

    #[test]
    fn test_stack_through_npm_with_relative_manifest() {
        let project = TempDir::new().unwrap();
        let tools = TempDir::new().unwrap();
        let dir = relative_to_cwd(project.path());
        let manifest = dir.join("package.json");
        std::fs::write(
            &manifest,
            r#"{ "name": "my-app", "version": "1.0.0", "dependencies": { "express": "^4", "@types/node": "^20" } }"#,
        )
        .unwrap();
        std::fs::write(
            dir.join(LOCK_FILE),
            r#"{ "lockfileVersion": 3, "packages": {
                "node_modules/express": { "version": "4.18.2" },
                "node_modules/@types/node": { "version": "20.1.0" } } }"#,
        )
        .unwrap();

        let mut config = Config::default();
        config
            .executables
            .insert("npm".into(), fake_tool(&tools.path().join("npm"), NPM));
        let provider = NpmProvider::new(manifest, config);

        let component = purls(&provider.provide_component().unwrap());
        let stack = purls(&provider.provide_stack().unwrap());
        assert_eq!(component.len(), 2);
        assert!(component.is_subset(&stack));
        assert!(stack.contains("pkg:npm/body-parser@1.20.1"));
    }
}
