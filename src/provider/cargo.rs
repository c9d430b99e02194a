use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use super::{executable, manifest_dir, read_manifest, require_lock_file, Provider};
use crate::config::Config;
use crate::error::ProviderError;
use crate::graph::DependencyGraph;
use crate::models::{Content, Ecosystem, Package};
use crate::sbom;

const LOCK_FILE: &str = "Cargo.lock";

#[derive(Debug, Deserialize)]
struct CargoManifest {
    package: Option<ManifestPackage>,
    #[serde(default)]
    dependencies: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Deserialize)]
struct ManifestPackage {
    name: String,
    /// A string, or `{ workspace = true }` for inherited versions.
    version: Option<toml::Value>,
}

#[derive(Debug, Deserialize)]
struct CargoLock {
    #[serde(default)]
    package: Vec<CargoLockPackage>,
}

#[derive(Debug, Deserialize)]
struct CargoLockPackage {
    name: String,
    version: String,
    /// Packages without a `source` field are local workspace members.
    source: Option<String>,
    /// Entries of the form `name`, `name version` or `name version (source)`.
    #[serde(default)]
    dependencies: Vec<String>,
}

/// Provider for Rust crates (`Cargo.toml`).
///
/// Everything is resolved offline from `Cargo.lock`, which must sit next to
/// the manifest. Only `[dependencies]` count as direct; dev and build
/// dependencies are left out.
pub struct CargoProvider {
    manifest: PathBuf,
    config: Config,
}

impl CargoProvider {
    pub fn new(manifest: PathBuf, config: Config) -> Self {
        Self { manifest, config }
    }

    /// Full graph from the lock file; component analysis projects it down.
    fn resolve(&self) -> Result<DependencyGraph, ProviderError> {
        let content = read_manifest(&self.manifest)?;
        let manifest: CargoManifest =
            toml::from_str(&content).map_err(|e| ProviderError::manifest(&self.manifest, e))?;
        let package = manifest.package.as_ref().ok_or_else(|| {
            ProviderError::manifest(&self.manifest, "no [package] table (virtual workspace manifests are not supported)")
        })?;

        let lock_path = require_lock_file(manifest_dir(&self.manifest), LOCK_FILE)?;
        let lock: CargoLock = std::fs::read_to_string(&lock_path)
            .map_err(|e| ProviderError::manifest(&lock_path, e))
            .and_then(|s| toml::from_str(&s).map_err(|e| ProviderError::manifest(&lock_path, e)))?;

        let declared: Vec<String> = manifest
            .dependencies
            .iter()
            .map(|(key, spec)| crate_name(key, spec))
            .collect();
        debug!(crate_name = %package.name, declared = declared.len(), "resolving from Cargo.lock");

        build_graph(package, &declared, &lock)
    }
}

impl Provider for CargoProvider {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Cargo
    }

    fn manifest(&self) -> &Path {
        &self.manifest
    }

    fn provide_stack(&self) -> Result<Content, ProviderError> {
        let graph = self.resolve()?;
        sbom::to_content(&graph)
    }

    fn provide_component(&self) -> Result<Content, ProviderError> {
        let graph = self.resolve()?;
        sbom::to_content(&graph.direct_only())
    }

    fn validate_lock_file(&self, lock_file_dir: &Path) -> Result<(), ProviderError> {
        require_lock_file(lock_file_dir, LOCK_FILE).map(|_| ())
    }

    fn executable(&self, command: &str) -> Result<PathBuf, ProviderError> {
        executable::resolve(&self.config, command, &[])
    }
}

/// Real crate name of a `[dependencies]` entry, honouring `package = "..."` renames.
fn crate_name(key: &str, spec: &toml::Value) -> String {
    spec.get("package")
        .and_then(toml::Value::as_str)
        .unwrap_or(key)
        .to_string()
}

/// Split a lock dependency reference into name and optional version.
fn parse_lock_ref(reference: &str) -> (&str, Option<&str>) {
    let mut parts = reference.split_whitespace();
    let name = parts.next().unwrap_or(reference);
    (name, parts.next())
}

fn find_locked<'a>(lock: &'a CargoLock, name: &str, version: Option<&str>) -> Option<&'a CargoLockPackage> {
    lock.package
        .iter()
        .find(|p| p.name == name && version.map_or(true, |v| p.version == v))
}

fn to_package(locked: &CargoLockPackage) -> Package {
    Package::new(Ecosystem::Cargo, &locked.name, &locked.version)
}

fn build_graph(
    manifest: &ManifestPackage,
    declared: &[String],
    lock: &CargoLock,
) -> Result<DependencyGraph, ProviderError> {
    let manifest_version = manifest.version.as_ref().and_then(toml::Value::as_str);
    let root_entry = lock
        .package
        .iter()
        .filter(|p| p.name == manifest.name && p.source.is_none())
        .find(|p| manifest_version.map_or(true, |v| p.version == v))
        .ok_or_else(|| ProviderError::Unresolved {
            package: manifest.name.clone(),
            reason: format!("not present in {}", LOCK_FILE),
        })?;

    let root = to_package(root_entry);
    let mut graph = DependencyGraph::new(root.clone());
    let mut queue: VecDeque<&CargoLockPackage> = VecDeque::new();

    for name in declared {
        let locked = root_entry
            .dependencies
            .iter()
            .map(|r| parse_lock_ref(r))
            .find(|(dep_name, _)| dep_name == name)
            .and_then(|(dep_name, version)| find_locked(lock, dep_name, version))
            .ok_or_else(|| ProviderError::Unresolved {
                package: name.clone(),
                reason: format!("not present in {}", LOCK_FILE),
            })?;
        graph.add(&root, to_package(locked));
        queue.push_back(locked);
    }

    let mut expanded: BTreeSet<(&str, &str)> = BTreeSet::new();
    while let Some(locked) = queue.pop_front() {
        if !expanded.insert((locked.name.as_str(), locked.version.as_str())) {
            continue;
        }
        let parent = to_package(locked);
        for reference in &locked.dependencies {
            let (name, version) = parse_lock_ref(reference);
            let child = find_locked(lock, name, version).ok_or_else(|| ProviderError::Unresolved {
                package: reference.clone(),
                reason: format!("referenced by {} but missing from {}", parent, LOCK_FILE),
            })?;
            graph.add(&parent, to_package(child));
            queue.push_back(child);
        }
    }

    Ok(graph)
}
