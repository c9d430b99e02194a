//! Manifest providers: one implementation of [`Provider`] per ecosystem.
//!
//! A provider is bound to a single manifest file and produces the request
//! body for either a stack analysis (the whole dependency tree) or a
//! component analysis (the declared dependencies only). [`create`] picks the
//! implementation from the manifest's file name.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::Config;
use crate::detector::ecosystem_for;
use crate::error::ProviderError;
use crate::models::{Content, Ecosystem};

pub mod cargo;
pub mod executable;
pub mod gradle;
pub mod maven;
pub mod npm;
pub mod pip;
mod process;
#[cfg(test)]
pub(crate) mod testing;

pub use cargo::CargoProvider;
pub use gradle::GradleProvider;
pub use maven::MavenProvider;
pub use npm::NpmProvider;
pub use pip::PipProvider;

/// Contract every ecosystem implementation satisfies.
///
/// Calls block on file I/O and on the package manager; callers that need a
/// deadline must impose it around the call. A failed call never yields a
/// partial [`Content`].
pub trait Provider: Send + Sync {
    /// Ecosystem handled by this instance, fixed at construction.
    fn ecosystem(&self) -> Ecosystem;

    /// Manifest this instance is bound to, fixed at construction.
    fn manifest(&self) -> &Path;

    /// Request body listing the full transitive dependency set.
    fn provide_stack(&self) -> Result<Content, ProviderError>;

    /// Request body listing only the direct dependencies declared in the manifest.
    fn provide_component(&self) -> Result<Content, ProviderError>;

    /// Check that the lock file this ecosystem needs exists in `lock_file_dir`.
    ///
    /// Lock files are optional unless an implementation overrides this, so
    /// the default always succeeds.
    fn validate_lock_file(&self, _lock_file_dir: &Path) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Resolve the package-manager executable for `command`.
    ///
    /// See [`executable::resolve`] for the lookup order.
    fn executable(&self, command: &str) -> Result<PathBuf, ProviderError>;
}

/// Build the provider for `manifest`, with its own copy of `config`.
pub fn create(manifest: &Path, config: &Config) -> Result<Box<dyn Provider>, ProviderError> {
    let ecosystem = ecosystem_for(manifest).ok_or_else(|| ProviderError::UnsupportedManifest {
        path: manifest.to_path_buf(),
    })?;
    debug!(manifest = %manifest.display(), %ecosystem, "creating provider");

    let manifest = manifest.to_path_buf();
    let config = config.clone();
    let provider: Box<dyn Provider> = match ecosystem {
        Ecosystem::Maven => Box::new(MavenProvider::new(manifest, config)),
        Ecosystem::Gradle => Box::new(GradleProvider::new(manifest, config)),
        Ecosystem::Npm => Box::new(NpmProvider::new(manifest, config)),
        Ecosystem::Pypi => Box::new(PipProvider::new(manifest, config)),
        Ecosystem::Cargo => Box::new(CargoProvider::new(manifest, config)),
    };
    Ok(provider)
}

/// Read the manifest, reporting any failure as [`ProviderError::ManifestRead`].
pub(crate) fn read_manifest(path: &Path) -> Result<String, ProviderError> {
    std::fs::read_to_string(path).map_err(|e| ProviderError::manifest(path, e))
}

/// Directory holding the manifest; `.` for a bare file name.
pub fn manifest_dir(manifest: &Path) -> &Path {
    manifest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Fallback project name: the manifest directory's name.
pub(crate) fn project_name(manifest: &Path) -> String {
    let dir = manifest_dir(manifest);
    dir.canonicalize()
        .ok()
        .as_deref()
        .and_then(Path::file_name)
        .or_else(|| dir.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string())
}

/// Fail with [`ProviderError::LockFileMissing`] unless `dir/lock_file` exists.
pub(crate) fn require_lock_file(dir: &Path, lock_file: &str) -> Result<PathBuf, ProviderError> {
    let path = dir.join(lock_file);
    if path.is_file() {
        Ok(path)
    } else {
        Err(ProviderError::LockFileMissing {
            lock_file: lock_file.to_string(),
            dir: dir.to_path_buf(),
        })
    }
}
