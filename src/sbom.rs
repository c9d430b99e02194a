//! CycloneDX 1.4 JSON encoding of a [`DependencyGraph`].
//!
//! The project itself is the metadata component; every reachable package is
//! listed once in `components`, and `dependencies` carries the edges keyed
//! by Package URL.

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::error::ProviderError;
use crate::graph::DependencyGraph;
use crate::models::{Content, Package, CYCLONEDX_MEDIA_TYPE};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Bom<'a> {
    bom_format: &'static str,
    spec_version: &'static str,
    version: u32,
    serial_number: String,
    metadata: Metadata<'a>,
    components: Vec<Component<'a>>,
    dependencies: Vec<DependencyEntry>,
}

#[derive(Debug, Serialize)]
struct Metadata<'a> {
    timestamp: String,
    component: Component<'a>,
}

#[derive(Debug, Serialize)]
struct Component<'a> {
    #[serde(rename = "type")]
    type_: &'static str,
    #[serde(rename = "bom-ref")]
    bom_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    group: Option<&'a str>,
    name: &'a str,
    version: &'a str,
    purl: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DependencyEntry {
    #[serde(rename = "ref")]
    reference: String,
    depends_on: Vec<String>,
}

impl<'a> Component<'a> {
    fn from_package(pkg: &'a Package, type_: &'static str) -> Self {
        let purl = pkg.purl();
        Component {
            type_,
            bom_ref: purl.clone(),
            group: pkg.namespace.as_deref(),
            name: &pkg.name,
            version: &pkg.version,
            purl,
        }
    }
}

/// Encode the reachable part of `graph` as a CycloneDX request body.
pub fn to_content(graph: &DependencyGraph) -> Result<Content, ProviderError> {
    let edges = graph.reachable_edges();

    let components = edges
        .iter()
        .skip(1)
        .map(|(pkg, _)| Component::from_package(pkg, "library"))
        .collect();

    let dependencies = edges
        .iter()
        .map(|(pkg, deps)| DependencyEntry {
            reference: pkg.purl(),
            depends_on: deps.iter().map(|d| d.purl()).collect(),
        })
        .collect();

    let bom = Bom {
        bom_format: "CycloneDX",
        spec_version: "1.4",
        version: 1,
        serial_number: format!("urn:uuid:{}", uuid::Uuid::new_v4()),
        metadata: Metadata {
            timestamp: Utc::now().to_rfc3339(),
            component: Component::from_package(graph.root(), "application"),
        },
        components,
        dependencies,
    };

    let buffer = serde_json::to_vec(&bom)?;
    info!(
        root = %graph.root(),
        components = edges.len() - 1,
        bytes = buffer.len(),
        "encoded sbom"
    );
    Ok(Content::new(buffer, CYCLONEDX_MEDIA_TYPE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Ecosystem;
    use serde_json::Value;

    #[test]
    fn test_bom_layout() {
        let root = Package::maven(Ecosystem::Maven, "com.example", "app", "1.0");
        let a = Package::maven(Ecosystem::Maven, "org.a", "a", "1.0");
        let c = Package::maven(Ecosystem::Maven, "org.c", "c", "2.0");
        let mut g = DependencyGraph::new(root);
        g.add_direct(a.clone());
        g.add(&a, c);

        let content = to_content(&g).unwrap();
        assert_eq!(content.content_type(), CYCLONEDX_MEDIA_TYPE);

        let json: Value = serde_json::from_slice(content.buffer()).unwrap();
        assert_eq!(json["bomFormat"], "CycloneDX");
        assert_eq!(json["metadata"]["component"]["purl"], "pkg:maven/com.example/app@1.0");
        assert_eq!(json["components"].as_array().unwrap().len(), 2);
        assert_eq!(json["components"][0]["group"], "org.a");

        let deps = json["dependencies"].as_array().unwrap();
        assert_eq!(deps.len(), 3);
        assert_eq!(deps[0]["ref"], "pkg:maven/com.example/app@1.0");
        assert_eq!(deps[0]["dependsOn"][0], "pkg:maven/org.a/a@1.0");
        assert_eq!(deps[1]["dependsOn"][0], "pkg:maven/org.c/c@2.0");
    }

    #[test]
    fn test_empty_graph_still_encodes() {
        let g = DependencyGraph::new(Package::new(Ecosystem::Cargo, "empty", "0.1.0"));
        let content = to_content(&g).unwrap();
        let json: Value = serde_json::from_slice(content.buffer()).unwrap();
        assert!(json["components"].as_array().unwrap().is_empty());
        assert_eq!(json["dependencies"].as_array().unwrap().len(), 1);
    }
}
