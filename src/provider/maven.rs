use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{debug, warn};

use super::{executable, manifest_dir, process, read_manifest, Provider};
use crate::config::Config;
use crate::error::ProviderError;
use crate::graph::DependencyGraph;
use crate::models::{Content, Ecosystem, Package};
use crate::sbom;

/// Provider for Maven projects (`pom.xml`).
///
/// Component analysis reads the pom directly; stack analysis runs
/// `mvn dependency:tree` and parses its text output. Test-scoped
/// dependencies are left out of both.
pub struct MavenProvider {
    manifest: PathBuf,
    config: Config,
}

impl MavenProvider {
    pub fn new(manifest: PathBuf, config: Config) -> Self {
        Self { manifest, config }
    }

    fn wrapper_name() -> &'static str {
        if cfg!(windows) {
            "mvnw.cmd"
        } else {
            "mvnw"
        }
    }

    fn load_pom(&self) -> Result<Pom, ProviderError> {
        let content = read_manifest(&self.manifest)?;
        parse_pom(&content).map_err(|reason| ProviderError::manifest(&self.manifest, reason))
    }
}

impl Provider for MavenProvider {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Maven
    }

    fn manifest(&self) -> &Path {
        &self.manifest
    }

    fn provide_stack(&self) -> Result<Content, ProviderError> {
        self.load_pom()?;
        let mvn = self.executable("mvn")?;

        let output = tempfile::Builder::new()
            .prefix("depscope-mvn-tree")
            .suffix(".txt")
            .tempfile()
            .map_err(|e| ProviderError::tool("mvn dependency:tree", e))?;

        // mvn runs inside the manifest directory, so `-f` takes the bare file name.
        let pom_file = self
            .manifest
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| self.manifest.clone().into_os_string());
        let mut output_arg = OsString::from("-DoutputFile=");
        output_arg.push(output.path());
        let args: Vec<OsString> = vec![
            "-q".into(),
            "dependency:tree".into(),
            "-DoutputType=text".into(),
            output_arg,
            "-f".into(),
            pom_file,
        ];
        process::run(&mvn, args, manifest_dir(&self.manifest))?;

        let tree = std::fs::read_to_string(output.path())
            .map_err(|e| ProviderError::tool("mvn dependency:tree", e))?;
        let graph = parse_dependency_tree(&tree)
            .map_err(|reason| ProviderError::tool("mvn dependency:tree", reason))?;
        sbom::to_content(&graph)
    }

    fn provide_component(&self) -> Result<Content, ProviderError> {
        let pom = self.load_pom()?;
        let root = pom
            .root()
            .ok_or_else(|| ProviderError::manifest(&self.manifest, "missing <artifactId>"))?;

        let mut graph = DependencyGraph::new(root);
        for dep in pom.direct_dependencies() {
            graph.add_direct(dep);
        }
        sbom::to_content(&graph)
    }

    fn executable(&self, command: &str) -> Result<PathBuf, ProviderError> {
        let wrappers = if command == "mvn" {
            executable::ancestor_wrappers(manifest_dir(&self.manifest), Self::wrapper_name())
        } else {
            Vec::new()
        };
        executable::resolve(&self.config, command, &wrappers)
    }
}

#[derive(Debug, Default, Clone)]
struct PomDependency {
    group_id: String,
    artifact_id: String,
    version: String,
    scope: String,
}

/// The parts of a pom needed to list its declared dependencies.
#[derive(Debug, Default)]
struct Pom {
    group_id: Option<String>,
    artifact_id: Option<String>,
    version: Option<String>,
    parent_group_id: Option<String>,
    parent_version: Option<String>,
    properties: HashMap<String, String>,
    dependencies: Vec<PomDependency>,
    managed: Vec<PomDependency>,
}

impl Pom {
    fn group(&self) -> String {
        self.group_id
            .clone()
            .or_else(|| self.parent_group_id.clone())
            .unwrap_or_default()
    }

    fn project_version(&self) -> String {
        self.version
            .clone()
            .or_else(|| self.parent_version.clone())
            .unwrap_or_default()
    }

    fn root(&self) -> Option<Package> {
        let artifact = self.artifact_id.as_deref()?;
        Some(Package::maven(
            Ecosystem::Maven,
            &self.interpolate(&self.group()),
            artifact,
            &self.interpolate(&self.project_version()),
        ))
    }

    /// Replace `${...}` references with pom properties and project coordinates.
    fn interpolate(&self, value: &str) -> String {
        let mut current = value.to_string();

        // Properties may reference other properties; bound the passes.
        for _ in 0..5 {
            if !current.contains("${") {
                break;
            }
            let next = self.substitute_once(&current);
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    fn substitute_once(&self, value: &str) -> String {
        let mut out = String::with_capacity(value.len());
        let mut rest = value;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                out.push_str(&rest[start..]);
                return out;
            };
            let key = &after[..end];
            match self.lookup_property(key) {
                Some(v) => out.push_str(&v),
                None => {
                    out.push_str("${");
                    out.push_str(key);
                    out.push('}');
                }
            }
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        out
    }

    fn lookup_property(&self, key: &str) -> Option<String> {
        match key {
            "project.version" | "pom.version" | "version" => Some(self.project_version()),
            "project.groupId" | "pom.groupId" => Some(self.group()),
            "project.artifactId" | "pom.artifactId" => self.artifact_id.clone(),
            "project.parent.version" => self.parent_version.clone(),
            "project.parent.groupId" => self.parent_group_id.clone(),
            _ => self.properties.get(key).cloned(),
        }
    }

    fn managed_version(&self, group_id: &str, artifact_id: &str) -> Option<String> {
        self.managed
            .iter()
            .find(|m| {
                self.interpolate(&m.group_id) == group_id
                    && self.interpolate(&m.artifact_id) == artifact_id
            })
            .map(|m| self.interpolate(&m.version))
            .filter(|v| !v.is_empty())
    }

    /// Declared dependencies outside the `test` scope, properties resolved.
    fn direct_dependencies(&self) -> Vec<Package> {
        self.dependencies
            .iter()
            .filter(|d| d.scope != "test")
            .map(|d| {
                let group_id = self.interpolate(&d.group_id);
                let artifact_id = self.interpolate(&d.artifact_id);
                let mut version = self.interpolate(&d.version);
                if version.is_empty() {
                    version = self
                        .managed_version(&group_id, &artifact_id)
                        .unwrap_or_default();
                }
                if version.is_empty() || version.contains("${") {
                    warn!(
                        dependency = %format!("{}:{}", group_id, artifact_id),
                        "version not resolvable from the pom alone"
                    );
                }
                Package::maven(Ecosystem::Maven, &group_id, &artifact_id, &version)
            })
            .collect()
    }
}

/// Parse a `pom.xml` with the quick-xml event API, tracking the element path.
fn parse_pom(content: &str) -> Result<Pom, String> {
    const DEPENDENCY: &str = "project/dependencies/dependency";
    const MANAGED: &str = "project/dependencyManagement/dependencies/dependency";

    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut pom = Pom::default();
    let mut path: Vec<String> = Vec::new();
    let mut current = PomDependency::default();
    let mut buf = Vec::new();
    let mut saw_project = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.name().local_name().as_ref()).into_owned();
                path.push(name);
                let joined = path.join("/");
                if joined == "project" {
                    saw_project = true;
                }
                if joined == DEPENDENCY || joined == MANAGED {
                    current = PomDependency::default();
                }
            }
            Ok(Event::End(_)) => {
                let joined = path.join("/");
                if joined == DEPENDENCY && !current.artifact_id.is_empty() {
                    pom.dependencies.push(std::mem::take(&mut current));
                } else if joined == MANAGED && !current.artifact_id.is_empty() {
                    pom.managed.push(std::mem::take(&mut current));
                }
                path.pop();
            }
            Ok(Event::Text(ref e)) => {
                let text = e.unescape().map_err(|e| e.to_string())?.trim().to_string();
                let joined = path.join("/");
                let (parent, field) = joined.rsplit_once('/').unwrap_or(("", joined.as_str()));
                match (parent, field) {
                    ("project", "groupId") => pom.group_id = Some(text),
                    ("project", "artifactId") => pom.artifact_id = Some(text),
                    ("project", "version") => pom.version = Some(text),
                    ("project/parent", "groupId") => pom.parent_group_id = Some(text),
                    ("project/parent", "version") => pom.parent_version = Some(text),
                    ("project/properties", key) => {
                        pom.properties.insert(key.to_string(), text);
                    }
                    (DEPENDENCY, _) | (MANAGED, _) => match field {
                        "groupId" => current.group_id = text,
                        "artifactId" => current.artifact_id = text,
                        "version" => current.version = text,
                        "scope" => current.scope = text,
                        _ => {}
                    },
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "malformed XML at byte {}: {}",
                    reader.buffer_position(),
                    e
                ))
            }
            _ => {}
        }
        buf.clear();
    }

    if !saw_project {
        return Err("no <project> element".to_string());
    }
    debug!(
        dependencies = pom.dependencies.len(),
        managed = pom.managed.len(),
        "parsed pom"
    );
    Ok(pom)
}

/// Parse the text output of `mvn dependency:tree -DoutputType=text`.
///
/// ```text
/// com.example:app:jar:1.0.0
/// +- org.a:a:jar:1.0:compile
/// |  \- org.c:c:jar:2.0:compile
/// \- org.b:b:jar:1.1:test
/// ```
///
/// Only the first module's tree is read. Test-scoped nodes are dropped with
/// their subtrees.
fn parse_dependency_tree(tree: &str) -> Result<DependencyGraph, String> {
    let mut graph: Option<DependencyGraph> = None;
    let mut stack: Vec<Package> = Vec::new();
    let mut skip_below: Option<usize> = None;

    for line in tree.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let start = line
            .find(|c: char| !matches!(c, '|' | '+' | '\\' | '-' | ' '))
            .unwrap_or(line.len());
        let depth = start / 3;
        let coords = match line[start..].split_whitespace().next() {
            Some(c) => c,
            None => continue,
        };

        if depth == 0 {
            if graph.is_some() {
                break;
            }
            let root = parse_root_coordinates(coords)
                .ok_or_else(|| format!("unrecognised root line `{}`", line))?;
            stack.push(root.clone());
            graph = Some(DependencyGraph::new(root));
            continue;
        }

        if let Some(limit) = skip_below {
            if depth > limit {
                continue;
            }
            skip_below = None;
        }

        let (pkg, scope) = parse_child_coordinates(coords)
            .ok_or_else(|| format!("unrecognised dependency line `{}`", line))?;
        if scope == "test" {
            skip_below = Some(depth);
            continue;
        }

        let graph = graph
            .as_mut()
            .ok_or_else(|| "dependency listed before the project line".to_string())?;
        if stack.len() < depth {
            return Err(format!("unexpected indentation in `{}`", line));
        }
        stack.truncate(depth);
        let parent = stack
            .last()
            .cloned()
            .ok_or_else(|| format!("no parent for `{}`", line))?;
        graph.add(&parent, pkg.clone());
        stack.push(pkg);
    }

    graph.ok_or_else(|| "empty dependency tree".to_string())
}

/// `group:artifact:type[:classifier]:version`
fn parse_root_coordinates(coords: &str) -> Option<Package> {
    let parts: Vec<&str> = coords.split(':').collect();
    if parts.len() < 4 {
        return None;
    }
    let version = parts[parts.len() - 1];
    Some(Package::maven(Ecosystem::Maven, parts[0], parts[1], version))
}

/// `group:artifact:type[:classifier]:version:scope`
fn parse_child_coordinates(coords: &str) -> Option<(Package, &str)> {
    let parts: Vec<&str> = coords.split(':').collect();
    if parts.len() < 5 {
        return None;
    }
    let scope = parts[parts.len() - 1];
    let version = parts[parts.len() - 2];
    Some((
        Package::maven(Ecosystem::Maven, parts[0], parts[1], version),
        scope,
    ))
}
