//! Error types for the provider layer.

use std::path::PathBuf;

/// Errors raised while turning a manifest into request content.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The manifest is missing, unreadable, or malformed.
    #[error("failed to read manifest `{}`: {reason}", path.display())]
    ManifestRead {
        /// Path to the manifest.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// A lock file the ecosystem requires is absent.
    #[error("lock file `{lock_file}` not found in `{}`; generate it with the package manager before analysis", dir.display())]
    LockFileMissing {
        /// Expected file name.
        lock_file: String,
        /// Directory that was searched.
        dir: PathBuf,
    },

    /// No usable package-manager executable was found.
    #[error("cannot resolve executable `{command}`: {reason}")]
    ExecutableResolution {
        /// Command that was looked up.
        command: String,
        /// What went wrong.
        reason: String,
    },

    /// The package manager failed or produced output that could not be parsed.
    #[error("`{command}` failed: {reason}")]
    ToolFailed { command: String, reason: String },

    /// A pinned manifest version differs from the resolved one.
    #[error("version mismatch for `{package}`: manifest declares {declared}, resolved {installed}")]
    VersionMismatch {
        package: String,
        declared: String,
        installed: String,
    },

    /// A declared dependency has no resolved version.
    #[error("cannot resolve `{package}`: {reason}")]
    Unresolved { package: String, reason: String },

    /// No provider handles this manifest file name.
    #[error("unsupported manifest `{}`", path.display())]
    UnsupportedManifest { path: PathBuf },

    /// Serializing the request body failed.
    #[error("failed to encode content: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ProviderError {
    pub(crate) fn manifest(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        ProviderError::ManifestRead {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn tool(command: impl Into<String>, reason: impl ToString) -> Self {
        ProviderError::ToolFailed {
            command: command.into(),
            reason: reason.to_string(),
        }
    }
}
