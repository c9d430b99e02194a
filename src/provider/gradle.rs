use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::debug;

use super::{executable, manifest_dir, process, project_name, read_manifest, Provider};
use crate::config::Config;
use crate::error::ProviderError;
use crate::graph::DependencyGraph;
use crate::models::{Content, Ecosystem, Package};
use crate::sbom;

/// Configurations whose declarations count as direct dependencies.
///
/// All of them feed [`STACK_CONFIGURATION`]; `compileOnly` does not and is left out.
const CONFIGURATIONS: &str = "implementation|api|runtimeOnly|compile|runtime";

/// Configuration resolved for stack analysis.
const STACK_CONFIGURATION: &str = "runtimeClasspath";

/// Provider for Gradle builds (`build.gradle` / `build.gradle.kts`).
///
/// Component analysis scans the build script; stack analysis runs
/// `gradle dependencies` for the runtime classpath. With
/// `match_manifest_versions` set, conflict-resolved versions (`1.0 -> 1.2`)
/// are reported as declared rather than as resolved.
pub struct GradleProvider {
    manifest: PathBuf,
    config: Config,
}

impl GradleProvider {
    pub fn new(manifest: PathBuf, config: Config) -> Self {
        Self { manifest, config }
    }

    fn wrapper_name() -> &'static str {
        if cfg!(windows) {
            "gradlew.bat"
        } else {
            "gradlew"
        }
    }

    fn root(&self, script: &str) -> Package {
        let dir = manifest_dir(&self.manifest);
        let name = ["settings.gradle", "settings.gradle.kts"]
            .iter()
            .filter_map(|f| std::fs::read_to_string(dir.join(f)).ok())
            .find_map(|settings| capture(&settings, r#"rootProject\.name\s*=\s*['"]([^'"]+)['"]"#))
            .unwrap_or_else(|| project_name(&self.manifest));
        let group = capture(script, r#"(?m)^\s*group\s*=\s*['"]([^'"]+)['"]"#).unwrap_or_default();
        let version = capture(script, r#"(?m)^\s*version\s*=\s*['"]([^'"]+)['"]"#)
            .unwrap_or_else(|| "0.0.0".to_string());
        Package::maven(Ecosystem::Gradle, &group, &name, &version)
    }
}

impl Provider for GradleProvider {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Gradle
    }

    fn manifest(&self) -> &Path {
        &self.manifest
    }

    fn provide_stack(&self) -> Result<Content, ProviderError> {
        let script = read_manifest(&self.manifest)?;
        let gradle = self.executable("gradle")?;

        let output = process::run(
            &gradle,
            ["-q", "dependencies", "--configuration", STACK_CONFIGURATION],
            manifest_dir(&self.manifest),
        )?;

        let mut graph = DependencyGraph::new(self.root(&script));
        parse_dependency_report(&output, &mut graph, self.config.match_manifest_versions)?;
        sbom::to_content(&graph)
    }

    fn provide_component(&self) -> Result<Content, ProviderError> {
        let script = read_manifest(&self.manifest)?;
        let declared = parse_build_script(&script)
            .map_err(|e| ProviderError::manifest(&self.manifest, e))?;
        debug!(count = declared.len(), "parsed gradle declarations");

        let mut graph = DependencyGraph::new(self.root(&script));
        for dep in declared {
            graph.add_direct(dep);
        }
        sbom::to_content(&graph)
    }

    fn executable(&self, command: &str) -> Result<PathBuf, ProviderError> {
        let wrappers = if command == "gradle" {
            executable::ancestor_wrappers(manifest_dir(&self.manifest), Self::wrapper_name())
        } else {
            Vec::new()
        };
        executable::resolve(&self.config, command, &wrappers)
    }
}

fn capture(haystack: &str, pattern: &str) -> Option<String> {
    Regex::new(pattern)
        .ok()?
        .captures(haystack)
        .map(|caps| caps[1].to_string())
}

/// Scan a Groovy or Kotlin build script for dependency declarations.
///
/// Matches the shorthand `implementation 'g:a:v'` / `implementation("g:a:v")`
/// and the map form `implementation group: 'g', name: 'a', version: 'v'`.
/// Test configurations are not in [`CONFIGURATIONS`] and are skipped.
fn parse_build_script(content: &str) -> Result<Vec<Package>, regex::Error> {
    let mut deps = Vec::new();

    let re_shorthand = Regex::new(&format!(
        r#"(?m)^\s*(?:{})\s*\(?\s*['"]([^'":\s]+):([^'":\s]+):([^'"\s]+)['"]"#,
        CONFIGURATIONS
    ))?;
    for caps in re_shorthand.captures_iter(content) {
        // Drop a trailing classifier or `@ext`.
        let version = caps[3]
            .split(|c: char| c == ':' || c == '@')
            .next()
            .unwrap_or_default();
        deps.push(Package::maven(Ecosystem::Gradle, &caps[1], &caps[2], version));
    }

    let re_map = Regex::new(&format!(
        r#"(?m)^\s*(?:{})\s*\(?\s*group\s*[:=]\s*['"]([^'"]+)['"]\s*,\s*name\s*[:=]\s*['"]([^'"]+)['"]\s*,\s*version\s*[:=]\s*['"]([^'"]+)['"]"#,
        CONFIGURATIONS
    ))?;
    for caps in re_map.captures_iter(content) {
        deps.push(Package::maven(Ecosystem::Gradle, &caps[1], &caps[2], &caps[3]));
    }

    Ok(deps)
}

/// Parse `gradle dependencies --configuration <conf>` output into `graph`.
///
/// ```text
/// runtimeClasspath - Runtime classpath of source set 'main'.
/// +--- org.a:a:1.0
/// |    \--- org.c:c:2.0
/// +--- org.b:b:1.0 -> 1.1
/// \--- org.a:a:1.0 (*)
/// ```
///
/// `(*)` marks a repeated subtree; `(c)` constraints and `(n)` unresolvable
/// declarations are skipped with their children. `project :x` lines are
/// elided, their children attach to the enclosing entry. `FAILED` entries
/// are errors.
fn parse_dependency_report(
    output: &str,
    graph: &mut DependencyGraph,
    prefer_declared: bool,
) -> Result<(), ProviderError> {
    let mut stack: Vec<Package> = vec![graph.root().clone()];
    let mut skip_below: Option<usize> = None;
    let mut in_tree = false;

    for line in output.lines() {
        let is_tree_line = line.starts_with("+---")
            || line.starts_with("\\---")
            || line.starts_with('|')
            || (in_tree && line.starts_with(' '));
        if !is_tree_line {
            if in_tree {
                break;
            }
            continue;
        }
        in_tree = true;

        let start = match line.find(|c: char| !matches!(c, '|' | '+' | '\\' | '-' | ' ')) {
            Some(start) => start,
            None => continue,
        };
        let depth = start / 5;

        if let Some(limit) = skip_below {
            if depth > limit {
                continue;
            }
            skip_below = None;
        }

        let entry = line[start..].trim();
        if entry.ends_with("(c)") || entry.ends_with("(n)") {
            skip_below = Some(depth);
            continue;
        }
        if entry.ends_with("FAILED") {
            return Err(ProviderError::Unresolved {
                package: entry.trim_end_matches("FAILED").trim().to_string(),
                reason: "gradle could not resolve it".to_string(),
            });
        }

        if depth == 0 || stack.len() < depth {
            return Err(ProviderError::tool(
                "gradle dependencies",
                format!("unexpected indentation in `{}`", line),
            ));
        }
        stack.truncate(depth);
        let parent = stack[depth - 1].clone();

        // Subprojects are not packages; what they bring in hangs off `parent`.
        if entry.starts_with("project ") {
            stack.push(parent);
            continue;
        }

        let pkg = parse_report_entry(entry, prefer_declared).ok_or_else(|| {
            ProviderError::tool("gradle dependencies", format!("unrecognised line `{}`", line))
        })?;
        graph.add(&parent, pkg.clone());
        stack.push(pkg);
    }

    Ok(())
}

/// `g:a:v`, `g:a:v -> v2`, `g:a -> v2`, optionally followed by `(*)`.
fn parse_report_entry(entry: &str, prefer_declared: bool) -> Option<Package> {
    let entry = entry.trim_end_matches("(*)").trim();
    let (coords, resolved) = match entry.split_once(" -> ") {
        Some((coords, resolved)) => (coords.trim(), Some(resolved.trim())),
        None => (entry, None),
    };

    let mut parts = coords.split(':');
    let group = parts.next()?;
    let artifact = parts.next()?;
    let declared = parts.next();

    let version = match (declared, resolved) {
        (Some(declared), Some(_)) if prefer_declared => declared,
        (_, Some(resolved)) => resolved,
        (Some(declared), None) => declared,
        (None, None) => return None,
    };
    Some(Package::maven(Ecosystem::Gradle, group, artifact, version))
}
