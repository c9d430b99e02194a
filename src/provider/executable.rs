//! Package-manager executable lookup shared by all providers.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::Config;
use crate::error::ProviderError;

/// Resolve `command` to an invocable path.
///
/// Lookup order:
/// 1. explicit override in [`Config::executables`]; an override that is not
///    an executable file is an error rather than a fall-through
/// 2. the first executable entry of `wrappers`, when [`Config::use_wrappers`] is set
/// 3. the `PATH`
pub fn resolve(config: &Config, command: &str, wrappers: &[PathBuf]) -> Result<PathBuf, ProviderError> {
    if let Some(path) = config.executable_override(command) {
        if is_executable(path) {
            debug!(command, path = %path.display(), "using configured executable");
            return Ok(path.to_path_buf());
        }
        return Err(ProviderError::ExecutableResolution {
            command: command.to_string(),
            reason: format!("configured path `{}` is not an executable file", path.display()),
        });
    }

    if config.use_wrappers {
        for wrapper in wrappers {
            if is_executable(wrapper) {
                debug!(command, wrapper = %wrapper.display(), "using project wrapper");
                return Ok(wrapper.clone());
            }
            if wrapper.exists() {
                warn!(wrapper = %wrapper.display(), "wrapper exists but is not executable, skipping");
            }
        }
    }

    match which::which(command) {
        Ok(path) => {
            debug!(command, path = %path.display(), "found executable on PATH");
            Ok(path)
        }
        Err(e) => Err(ProviderError::ExecutableResolution {
            command: command.to_string(),
            reason: format!("not found on PATH ({e})"),
        }),
    }
}

/// Candidate wrapper scripts named `name` in `dir` and each of its ancestors,
/// nearest first.
pub fn ancestor_wrappers(dir: &Path, name: &str) -> Vec<PathBuf> {
    let start = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
    start.ancestors().map(|d| d.join(name)).collect()
}

/// Virtualenv binaries for `command` under `dir/.venv` and `dir/venv`.
///
/// Candidates are absolute so they stay valid once the tool runs inside `dir`.
pub fn virtualenv_binaries(dir: &Path, command: &str) -> Vec<PathBuf> {
    let dir = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
    let (bin_dir, file) = if cfg!(windows) {
        ("Scripts", format!("{command}.exe"))
    } else {
        ("bin", command.to_string())
    };
    [".venv", "venv"]
        .iter()
        .map(|venv| dir.join(venv).join(bin_dir).join(&file))
        .collect()
}

#[cfg(unix)]
pub(crate) fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub(crate) fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::provider::testing::relative_to_cwd;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn touch(path: &Path, mode: u32) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).unwrap();
    }

    #[test]
    fn test_override_wins() {
        let dir = TempDir::new().unwrap();
        let custom = dir.path().join("custom-mvn");
        let wrapper = dir.path().join("mvnw");
        touch(&custom, 0o755);
        touch(&wrapper, 0o755);

        let mut cfg = Config::default();
        cfg.executables.insert("mvn".into(), custom.clone());

        let resolved = resolve(&cfg, "mvn", &[wrapper]).unwrap();
        assert_eq!(resolved, custom);
    }

    #[test]
    fn test_broken_override_is_an_error() {
        let dir = TempDir::new().unwrap();
        let custom = dir.path().join("not-executable");
        touch(&custom, 0o644);

        let mut cfg = Config::default();
        cfg.executables.insert("npm".into(), custom);

        let err = resolve(&cfg, "npm", &[]).unwrap_err();
        match err {
            ProviderError::ExecutableResolution { command, .. } => assert_eq!(command, "npm"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_wrapper_before_path() {
        let dir = TempDir::new().unwrap();
        let wrapper = dir.path().join("gradlew");
        touch(&wrapper, 0o755);

        let resolved = resolve(&Config::default(), "gradle", &[wrapper.clone()]).unwrap();
        assert_eq!(resolved, wrapper);
    }

    #[test]
    fn test_wrappers_disabled_or_not_executable() {
        let dir = TempDir::new().unwrap();
        let wrapper = dir.path().join("gradlew");
        touch(&wrapper, 0o644);
        let command = "depscope-test-no-such-tool";

        let err = resolve(&Config::default(), command, &[wrapper.clone()]).unwrap_err();
        assert!(matches!(err, ProviderError::ExecutableResolution { .. }));

        std::fs::set_permissions(&wrapper, std::fs::Permissions::from_mode(0o755)).unwrap();
        let mut cfg = Config::default();
        cfg.use_wrappers = false;
        let err = resolve(&cfg, command, &[wrapper]).unwrap_err();
        assert!(err.to_string().contains(command));
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let wrapper = dir.path().join("mvnw");
        touch(&wrapper, 0o755);
        let cfg = Config::default();
        let wrappers = ancestor_wrappers(dir.path(), "mvnw");

        let first = resolve(&cfg, "mvn", &wrappers).unwrap();
        let second = resolve(&cfg, "mvn", &wrappers).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.file_name().unwrap(), "mvnw");
    }

    #[test]
    fn test_ancestor_wrappers_nearest_first() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("module");
        std::fs::create_dir(&nested).unwrap();

        let wrappers = ancestor_wrappers(&nested, "gradlew");
        assert!(wrappers[0].ends_with("module/gradlew"));
        assert!(wrappers.len() > 2);
    }

    #[test]
    fn test_virtualenv_candidates_are_absolute() {
        let dir = TempDir::new().unwrap();
        let relative = relative_to_cwd(dir.path());

        let candidates = virtualenv_binaries(&relative, "pip3");
        let expected = dir.path().canonicalize().unwrap().join(".venv/bin/pip3");
        assert_eq!(candidates[0], expected);
    }

    #[test]
    fn test_virtualenv_candidates() {
        let candidates = virtualenv_binaries(Path::new("/proj"), "pip3");
        assert_eq!(
            candidates,
            vec![
                PathBuf::from("/proj/.venv/bin/pip3"),
                PathBuf::from("/proj/venv/bin/pip3")
            ]
        );
    }
}
