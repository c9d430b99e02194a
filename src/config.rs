use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Deserialize;
use tracing::debug;

use crate::models::MATCH_MANIFEST_VERSIONS;

/// Prefix of environment variables overriding an executable path,
/// e.g. `DEPSCOPE_MVN_PATH=/opt/maven/bin/mvn`.
pub const EXECUTABLE_ENV_PREFIX: &str = "DEPSCOPE_";
const EXECUTABLE_ENV_SUFFIX: &str = "_PATH";

/// Provider configuration, deserialized from `.depscope/config.toml`.
///
/// Each provider receives its own copy at construction; nothing reads the
/// process environment after [`load_config`] returns except the `PATH`
/// lookup during executable resolution.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Require resolved versions to match versions pinned in the manifest.
    #[serde(default)]
    pub match_manifest_versions: bool,
    /// Prefer project-local wrappers (`mvnw`, `gradlew`, virtualenv binaries).
    #[serde(default = "default_use_wrappers")]
    pub use_wrappers: bool,
    /// Explicit executable paths keyed by command name (`mvn`, `npm`, `pip3`, ...).
    #[serde(default)]
    pub executables: HashMap<String, PathBuf>,
}

fn default_use_wrappers() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Config {
            match_manifest_versions: false,
            use_wrappers: true,
            executables: HashMap::new(),
        }
    }
}

impl Config {
    /// Overlay environment variables onto this config.
    ///
    /// `MATCH_MANIFEST_VERSIONS` accepts `true`/`1`/`yes` (anything else
    /// disables it); `DEPSCOPE_<COMMAND>_PATH` sets the executable for
    /// `<command>` in lowercase.
    pub fn with_env_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let (key, value) = (key.as_ref(), value.as_ref());
            if key == MATCH_MANIFEST_VERSIONS {
                self.match_manifest_versions = parse_flag(value);
                continue;
            }
            let command = key
                .strip_prefix(EXECUTABLE_ENV_PREFIX)
                .and_then(|rest| rest.strip_suffix(EXECUTABLE_ENV_SUFFIX));
            if let Some(command) = command {
                if !command.is_empty() && !value.is_empty() {
                    self.executables
                        .insert(command.to_lowercase(), PathBuf::from(value));
                }
            }
        }
        self
    }

    pub fn executable_override(&self, command: &str) -> Option<&Path> {
        self.executables.get(command).map(PathBuf::as_path)
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes"
    )
}

/// Load the configuration, searching in order:
///
/// 1. `config_override`, the path passed via `--config`
/// 2. `<project_path>/.depscope/config.toml`
/// 3. `~/.config/depscope/config.toml`
/// 4. Built-in [`Config::default`]
///
/// The process environment is applied on top of whichever file was found.
pub fn load_config(project_path: &Path, config_override: Option<&Path>) -> Result<Config> {
    let config = read_config_file(project_path, config_override)?;
    Ok(config.with_env_vars(std::env::vars()))
}

fn read_config_file(project_path: &Path, config_override: Option<&Path>) -> Result<Config> {
    if let Some(path) = config_override {
        debug!(path = %path.display(), "loading config override");
        let content = std::fs::read_to_string(path)?;
        return Ok(toml::from_str(&content)?);
    }

    let project_config = project_path.join(".depscope").join("config.toml");
    if project_config.exists() {
        debug!(path = %project_config.display(), "loading project config");
        let content = std::fs::read_to_string(&project_config)?;
        return Ok(toml::from_str(&content)?);
    }

    if let Some(home) = dirs::home_dir() {
        let home_config = home.join(".config").join("depscope").join("config.toml");
        if home_config.exists() {
            debug!(path = %home_config.display(), "loading user config");
            let content = std::fs::read_to_string(&home_config)?;
            return Ok(toml::from_str(&content)?);
        }
    }

    Ok(Config::default())
}
