use serde::{Deserialize, Serialize};

/// Name of the option that forces resolved dependency versions to match the
/// versions declared in the manifest.
pub const MATCH_MANIFEST_VERSIONS: &str = "MATCH_MANIFEST_VERSIONS";

/// Media type of every request body produced by the providers.
pub const CYCLONEDX_MEDIA_TYPE: &str = "application/vnd.cyclonedx+json";

/// A serialized request body plus the content type the backend should use
/// to interpret it.
///
/// Both fields are fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    buffer: Vec<u8>,
    content_type: String,
}

impl Content {
    pub fn new(buffer: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            buffer,
            content_type: content_type.into(),
        }
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Hand the payload over to whatever builds the outbound request.
    pub fn into_parts(self) -> (Vec<u8>, String) {
        (self.buffer, self.content_type)
    }
}

/// Package ecosystems with a provider implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Maven,
    Gradle,
    Npm,
    Pypi,
    Cargo,
}

impl Ecosystem {
    /// Tag used by the backend to route a request.
    pub fn as_str(&self) -> &'static str {
        match self {
            Ecosystem::Maven => "maven",
            Ecosystem::Gradle => "gradle",
            Ecosystem::Npm => "npm",
            Ecosystem::Pypi => "pypi",
            Ecosystem::Cargo => "cargo",
        }
    }

    /// Package-URL type. Gradle resolves Maven artifacts.
    pub fn purl_type(&self) -> &'static str {
        match self {
            Ecosystem::Maven | Ecosystem::Gradle => "maven",
            Ecosystem::Npm => "npm",
            Ecosystem::Pypi => "pypi",
            Ecosystem::Cargo => "cargo",
        }
    }
}

impl std::fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single resolved package coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Package {
    pub ecosystem: Ecosystem,
    /// Maven group id or npm scope (with the leading `@`).
    pub namespace: Option<String>,
    pub name: String,
    pub version: String,
}

impl Package {
    pub fn new(ecosystem: Ecosystem, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            ecosystem,
            namespace: None,
            name: name.into(),
            version: version.into(),
        }
    }

    /// Maven-style `group:artifact` coordinate. An empty group is dropped.
    pub fn maven(ecosystem: Ecosystem, group: &str, artifact: &str, version: &str) -> Self {
        let namespace = (!group.is_empty()).then(|| group.to_string());
        Self {
            ecosystem,
            namespace,
            name: artifact.to_string(),
            version: version.to_string(),
        }
    }

    /// npm package, splitting `@scope/name` into namespace and name.
    pub fn npm(name: &str, version: &str) -> Self {
        match name.strip_prefix('@').and_then(|rest| rest.split_once('/')) {
            Some((scope, bare)) => Self {
                ecosystem: Ecosystem::Npm,
                namespace: Some(format!("@{}", scope)),
                name: bare.to_string(),
                version: version.to_string(),
            },
            None => Self::new(Ecosystem::Npm, name, version),
        }
    }

    /// Python package with its name normalized per PEP 503.
    pub fn pypi(name: &str, version: &str) -> Self {
        Self::new(Ecosystem::Pypi, normalize_python_name(name), version)
    }

    /// Package URL, e.g. `pkg:maven/org.slf4j/slf4j-api@2.0.9`.
    pub fn purl(&self) -> String {
        let mut purl = format!("pkg:{}/", self.ecosystem.purl_type());
        if let Some(ns) = &self.namespace {
            purl.push_str(&ns.replace('@', "%40"));
            purl.push('/');
        }
        purl.push_str(&self.name);
        if !self.version.is_empty() {
            purl.push('@');
            purl.push_str(&self.version);
        }
        purl
    }
}

impl std::fmt::Display for Package {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) if self.ecosystem == Ecosystem::Npm => write!(f, "{}/{}@{}", ns, self.name, self.version),
            Some(ns) => write!(f, "{}:{}:{}", ns, self.name, self.version),
            None => write!(f, "{}@{}", self.name, self.version),
        }
    }
}

/// Lowercase and collapse runs of `-`, `_` and `.` into a single `-`.
pub fn normalize_python_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_sep = false;
    for c in name.trim().chars() {
        if matches!(c, '-' | '_' | '.') {
            if !last_sep {
                out.push('-');
            }
            last_sep = true;
        } else {
            out.extend(c.to_lowercase());
            last_sep = false;
        }
    }
    out
}
