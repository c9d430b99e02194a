use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::debug;

use super::{executable, manifest_dir, process, project_name, read_manifest, Provider};
use crate::config::Config;
use crate::error::ProviderError;
use crate::graph::DependencyGraph;
use crate::models::{normalize_python_name, Content, Ecosystem, Package};
use crate::sbom;

/// Provider for pip projects (`requirements.txt`).
///
/// Versions come from the environment `pip` runs in (a project virtualenv
/// when one exists). With `match_manifest_versions` set, a requirement
/// pinned with `==` must match the installed version exactly.
pub struct PipProvider {
    manifest: PathBuf,
    config: Config,
}

/// One line of `requirements.txt`.
#[derive(Debug, Clone, PartialEq)]
struct Requirement {
    /// PEP 503 normalized name.
    name: String,
    /// Version given with `==` or `===`, if any.
    pinned: Option<String>,
}

/// One block of `pip show` output.
#[derive(Debug, Clone, PartialEq)]
struct ShowEntry {
    version: String,
    requires: Vec<String>,
}

impl PipProvider {
    pub fn new(manifest: PathBuf, config: Config) -> Self {
        Self { manifest, config }
    }

    fn load_requirements(&self) -> Result<Vec<Requirement>, ProviderError> {
        let content = read_manifest(&self.manifest)?;
        parse_requirements(&content).map_err(|e| ProviderError::manifest(&self.manifest, e))
    }

    /// `pip3`, falling back to `pip`.
    fn pip(&self) -> Result<PathBuf, ProviderError> {
        self.executable("pip3").or_else(|first| {
            debug!(error = %first, "pip3 not resolvable, trying pip");
            self.executable("pip").map_err(|_| first)
        })
    }

    fn installed(&self, pip: &Path) -> Result<BTreeMap<String, String>, ProviderError> {
        let freeze = process::run(pip, ["freeze", "--all"], manifest_dir(&self.manifest))?;
        Ok(parse_freeze(&freeze))
    }

    fn root(&self) -> Package {
        Package::pypi(&project_name(&self.manifest), "0.0.0")
    }
}

impl Provider for PipProvider {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Pypi
    }

    fn manifest(&self) -> &Path {
        &self.manifest
    }

    fn provide_stack(&self) -> Result<Content, ProviderError> {
        let requirements = self.load_requirements()?;
        let pip = self.pip()?;
        let installed = self.installed(&pip)?;

        let show = if installed.is_empty() {
            BTreeMap::new()
        } else {
            let mut args = vec!["show".to_string()];
            args.extend(installed.keys().cloned());
            let output = process::run(&pip, args, manifest_dir(&self.manifest))?;
            parse_show(&output)
        };

        let graph = build_graph(
            self.root(),
            &requirements,
            &installed,
            Some(&show),
            self.config.match_manifest_versions,
        )?;
        sbom::to_content(&graph)
    }

    fn provide_component(&self) -> Result<Content, ProviderError> {
        let requirements = self.load_requirements()?;
        let pip = self.pip()?;
        let installed = self.installed(&pip)?;

        let graph = build_graph(
            self.root(),
            &requirements,
            &installed,
            None,
            self.config.match_manifest_versions,
        )?;
        sbom::to_content(&graph)
    }

    fn executable(&self, command: &str) -> Result<PathBuf, ProviderError> {
        let wrappers = executable::virtualenv_binaries(manifest_dir(&self.manifest), command);
        executable::resolve(&self.config, command, &wrappers)
    }
}

/// Parse `requirements.txt`, skipping comments, options (`-r`, `-e`, `--index-url`)
/// and URL requirements.
fn parse_requirements(content: &str) -> Result<Vec<Requirement>, regex::Error> {
    let re = Regex::new(
        r"^([A-Za-z0-9][A-Za-z0-9._-]*)\s*(?:\[[^\]]*\])?\s*(?:(===|==|~=|!=|<=|>=|<|>)\s*([^\s;,#]+))?",
    )?;
    let mut requirements = Vec::new();

    for line in content.lines() {
        let line = line.split(" #").next().unwrap_or_default().trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('-') || line.contains("://") {
            continue;
        }
        if let Some(caps) = re.captures(line) {
            let pinned = match caps.get(2).map(|m| m.as_str()) {
                Some("==") | Some("===") => caps.get(3).map(|m| m.as_str().to_string()),
                _ => None,
            };
            requirements.push(Requirement {
                name: normalize_python_name(&caps[1]),
                pinned,
            });
        }
    }

    Ok(requirements)
}

/// Parse `pip freeze --all` into normalized name → version.
fn parse_freeze(output: &str) -> BTreeMap<String, String> {
    output
        .lines()
        .filter_map(|line| line.trim().split_once("=="))
        .map(|(name, version)| (normalize_python_name(name), version.trim().to_string()))
        .collect()
}

/// Parse `pip show` output (blocks separated by `---`) into normalized name → entry.
fn parse_show(output: &str) -> BTreeMap<String, ShowEntry> {
    let mut entries = BTreeMap::new();

    for block in output.split("\n---") {
        let mut name = None;
        let mut version = None;
        let mut requires = Vec::new();

        for line in block.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "Name" => name = Some(normalize_python_name(value)),
                "Version" => version = Some(value.to_string()),
                "Requires" => {
                    requires = value
                        .split(',')
                        .map(str::trim)
                        .filter(|r| !r.is_empty())
                        .map(normalize_python_name)
                        .collect();
                }
                _ => {}
            }
        }

        if let (Some(name), Some(version)) = (name, version) {
            entries.insert(name, ShowEntry { version, requires });
        }
    }

    entries
}

/// Build the graph for `requirements` against the installed environment.
///
/// Without `show` only direct requirements are added; with it, `Requires:`
/// edges are followed transitively.
fn build_graph(
    root: Package,
    requirements: &[Requirement],
    installed: &BTreeMap<String, String>,
    show: Option<&BTreeMap<String, ShowEntry>>,
    match_versions: bool,
) -> Result<DependencyGraph, ProviderError> {
    let mut graph = DependencyGraph::new(root);
    let mut queue = VecDeque::new();

    for req in requirements {
        let version = installed.get(&req.name).ok_or_else(|| ProviderError::Unresolved {
            package: req.name.clone(),
            reason: "not installed in the python environment".to_string(),
        })?;
        if let Some(pinned) = &req.pinned {
            if match_versions && pinned != version {
                return Err(ProviderError::VersionMismatch {
                    package: req.name.clone(),
                    declared: pinned.clone(),
                    installed: version.clone(),
                });
            }
        }
        let pkg = Package::pypi(&req.name, version);
        graph.add_direct(pkg.clone());
        queue.push_back(pkg);
    }

    let Some(show) = show else {
        return Ok(graph);
    };

    let mut expanded = BTreeSet::new();
    while let Some(pkg) = queue.pop_front() {
        if !expanded.insert(pkg.name.clone()) {
            continue;
        }
        let Some(entry) = show.get(&pkg.name) else {
            continue;
        };
        for dep in &entry.requires {
            let version = show
                .get(dep)
                .map(|e| e.version.clone())
                .or_else(|| installed.get(dep).cloned())
                .ok_or_else(|| ProviderError::Unresolved {
                    package: dep.clone(),
                    reason: format!("required by {} but not installed", pkg.name),
                })?;
            let child = Package::pypi(dep, &version);
            graph.add(&pkg, child.clone());
            queue.push_back(child);
        }
    }

    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn installed(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_requirements() {
        let content = "\
# comment
-r base.txt
--index-url https://pypi.example.com/simple
requests==2.28.1
Flask>=2.0.0
numpy==1.24.0 ; python_version >= '3.8'
uvicorn[standard]==0.23.2  # server
git+https://github.com/org/repo.git#egg=repo
";
        let reqs = parse_requirements(content).unwrap();
        let names: Vec<&str> = reqs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["requests", "flask", "numpy", "uvicorn"]);
        assert_eq!(reqs[0].pinned.as_deref(), Some("2.28.1"));
        assert_eq!(reqs[1].pinned, None);
        assert_eq!(reqs[3].pinned.as_deref(), Some("0.23.2"));
    }

    #[test]
    fn test_parse_freeze() {
        let out = "Flask==2.3.3\nJinja2==3.1.2\n-e git+https://x#egg=local\npip==23.2\n";
        let map = parse_freeze(out);
        assert_eq!(map.get("flask").map(String::as_str), Some("2.3.3"));
        assert_eq!(map.get("jinja2").map(String::as_str), Some("3.1.2"));
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn test_parse_show() {
        let out = "\
Name: Flask
Version: 2.3.3
Summary: A simple framework
Requires: Jinja2, itsdangerous
Required-by:
---
Name: Jinja2
Version: 3.1.2
Requires: MarkupSafe
---
Name: itsdangerous
Version: 2.1.2
Requires:
";
        let show = parse_show(out);
        assert_eq!(show.len(), 3);
        assert_eq!(show["flask"].requires, vec!["jinja2", "itsdangerous"]);
        assert_eq!(show["jinja2"].version, "3.1.2");
        assert!(show["itsdangerous"].requires.is_empty());
    }

    #[test]
    fn test_stack_is_superset_of_component() {
        // a, b declared; c pulled in by b
        let reqs = vec![
            Requirement { name: "a".into(), pinned: None },
            Requirement { name: "b".into(), pinned: Some("2.0".into()) },
        ];
        let installed = installed(&[("a", "1.0"), ("b", "2.0"), ("c", "3.0")]);
        let show: BTreeMap<String, ShowEntry> = [
            ("a", ShowEntry { version: "1.0".into(), requires: vec![] }),
            ("b", ShowEntry { version: "2.0".into(), requires: vec!["c".into()] }),
            ("c", ShowEntry { version: "3.0".into(), requires: vec![] }),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        let root = Package::pypi("proj", "0.0.0");

        let component = build_graph(root.clone(), &reqs, &installed, None, true).unwrap();
        let names: Vec<&str> = component.packages().into_iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);

        let stack = build_graph(root, &reqs, &installed, Some(&show), true).unwrap();
        let names: Vec<&str> = stack.packages().into_iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_match_manifest_versions() {
        let reqs = vec![Requirement { name: "requests".into(), pinned: Some("2.28.1".into()) }];
        let installed = installed(&[("requests", "2.31.0")]);
        let root = Package::pypi("proj", "0.0.0");

        let lenient = build_graph(root.clone(), &reqs, &installed, None, false).unwrap();
        assert_eq!(lenient.direct().next().unwrap().version, "2.31.0");

        let err = build_graph(root, &reqs, &installed, None, true).unwrap_err();
        match err {
            ProviderError::VersionMismatch { package, declared, installed } => {
                assert_eq!(package, "requests");
                assert_eq!(declared, "2.28.1");
                assert_eq!(installed, "2.31.0");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_install_is_unresolved() {
        let reqs = vec![Requirement { name: "absent".into(), pinned: None }];
        let err = build_graph(Package::pypi("proj", "0.0.0"), &reqs, &BTreeMap::new(), None, false)
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unresolved { .. }));
    }
}
