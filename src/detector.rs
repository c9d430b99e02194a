use std::path::Path;

use crate::models::Ecosystem;

/// Map a manifest file to the ecosystem that handles it, by file name.
pub fn ecosystem_for(manifest: &Path) -> Option<Ecosystem> {
    let file_name = manifest.file_name()?.to_str()?;

    match file_name {
        "pom.xml" => Some(Ecosystem::Maven),
        "build.gradle" | "build.gradle.kts" => Some(Ecosystem::Gradle),
        "package.json" => Some(Ecosystem::Npm),
        "requirements.txt" => Some(Ecosystem::Pypi),
        "Cargo.toml" => Some(Ecosystem::Cargo),
        _ => None,
    }
}
