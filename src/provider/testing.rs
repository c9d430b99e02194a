//! Fixtures shared by the provider tests.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::models::Content;

/// `path` expressed relative to the current directory, through `..` segments.
pub(crate) fn relative_to_cwd(path: &Path) -> PathBuf {
    let path = path.canonicalize().unwrap();
    let cwd = std::env::current_dir().unwrap().canonicalize().unwrap();
    let common = path
        .components()
        .zip(cwd.components())
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in cwd.components().skip(common) {
        relative.push("..");
    }
    for part in path.components().skip(common) {
        relative.push(part);
    }
    assert!(relative.is_relative());
    relative
}

/// Write an executable shell script standing in for a package manager.
#[cfg(unix)]
pub(crate) fn fake_tool(path: &Path, script: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, script).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_path_buf()
}

/// Package URLs listed in a CycloneDX content's `components`.
pub(crate) fn purls(content: &Content) -> BTreeSet<String> {
    let json: Value = serde_json::from_slice(content.buffer()).unwrap();
    json["components"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["purl"].as_str().unwrap().to_string())
        .collect()
}
