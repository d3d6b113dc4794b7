//! Client configuration
//!
//! Configuration layers, lowest precedence first:
//! - built-in defaults
//! - ~/.config/strongbox/config.yaml
//! - .strongbox.yaml found walking up from the working directory
//! - STRONGBOX_* environment variables
//!
//! Command-line flags sit on top of all of these and are applied by the
//! caller, not here.

use crate::paths::Paths;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of per-directory preferences
pub const DIR_PREFS_FILE: &str = ".strongbox.yaml";

/// Wildcard placeholder used by the defaults below
const WILDCARD: &str = "*";

/// Global client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// How to reach the local daemon
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Defaults for each addressing dimension
    #[serde(default)]
    pub defaults: AddressDefaults,
}

/// Daemon connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Socket path override (defaults to the runtime dir socket)
    #[serde(default)]
    pub socket: Option<PathBuf>,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Per-dimension defaults used when an addressing flag is omitted
///
/// An empty list means the dimension has no default and the flag is
/// required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressDefaults {
    #[serde(default)]
    pub org: Option<String>,

    #[serde(default)]
    pub project: Option<String>,

    #[serde(default)]
    pub environment: Vec<String>,

    #[serde(default = "default_service")]
    pub service: Vec<String>,

    #[serde(default = "default_wildcard")]
    pub identity: Vec<String>,

    #[serde(default = "default_wildcard")]
    pub instance: Vec<String>,
}

fn default_service() -> Vec<String> {
    vec!["default".to_string()]
}

fn default_wildcard() -> Vec<String> {
    vec![WILDCARD.to_string()]
}

impl Default for AddressDefaults {
    fn default() -> Self {
        Self {
            org: None,
            project: None,
            environment: Vec::new(),
            service: default_service(),
            identity: default_wildcard(),
            instance: default_wildcard(),
        }
    }
}

/// Preferences checked into a project directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirPrefs {
    #[serde(default)]
    pub org: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
}

impl DirPrefs {
    /// Walk up from `start` and load the first .strongbox.yaml found
    pub fn find(start: &Path) -> Result<Option<(PathBuf, Self)>> {
        for dir in start.ancestors() {
            let candidate = dir.join(DIR_PREFS_FILE);
            if candidate.is_file() {
                let content = std::fs::read_to_string(&candidate)
                    .with_context(|| format!("Failed to read {:?}", candidate))?;
                let prefs: Self = serde_yaml::from_str(&content)
                    .with_context(|| format!("Failed to parse {:?}", candidate))?;
                return Ok(Some((candidate, prefs)));
            }
        }
        Ok(None)
    }
}

impl Config {
    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {:?}", path))?;
            let config: Self = serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config from {:?}", path))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load every layer for a command run from `cwd`
    pub fn resolve(paths: &Paths, cwd: &Path) -> Result<Self> {
        let mut config = Self::load_from(&paths.config_file())?;
        if let Some((path, prefs)) = DirPrefs::find(cwd)? {
            debug!(path = %path.display(), "Applying directory preferences");
            config.defaults.apply_dir_prefs(&prefs);
        }
        config.defaults.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Socket to dial, honouring the override
    pub fn socket_path(&self, paths: &Paths) -> PathBuf {
        self.daemon.socket.clone().unwrap_or_else(|| paths.socket())
    }
}

impl AddressDefaults {
    /// Overlay directory preferences
    pub fn apply_dir_prefs(&mut self, prefs: &DirPrefs) {
        if let Some(org) = &prefs.org {
            self.org = Some(org.clone());
        }
        if let Some(project) = &prefs.project {
            self.project = Some(project.clone());
        }
        if let Some(env) = &prefs.environment {
            self.environment = vec![env.clone()];
        }
        if let Some(service) = &prefs.service {
            self.service = vec![service.clone()];
        }
    }

    /// Overlay STRONGBOX_* variables, read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(org) = non_empty("STRONGBOX_ORG") {
            self.org = Some(org.trim().to_string());
        }
        if let Some(project) = non_empty("STRONGBOX_PROJECT") {
            self.project = Some(project.trim().to_string());
        }
        if let Some(env) = lookup("STRONGBOX_ENVIRONMENT").and_then(|v| split_list(&v)) {
            self.environment = env;
        }
        if let Some(service) = lookup("STRONGBOX_SERVICE").and_then(|v| split_list(&v)) {
            self.service = service;
        }
        if let Some(instance) = lookup("STRONGBOX_INSTANCE").and_then(|v| split_list(&v)) {
            self.instance = instance;
        }
    }
}

/// Split a comma-separated variable into its values, `None` if it has none
fn split_list(value: &str) -> Option<Vec<String>> {
    let values: Vec<String> = value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let defaults = AddressDefaults::default();
        assert!(defaults.org.is_none());
        assert!(defaults.environment.is_empty());
        assert_eq!(defaults.service, vec!["default"]);
        assert_eq!(defaults.identity, vec!["*"]);
        assert_eq!(defaults.instance, vec!["*"]);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.yaml")).unwrap();
        assert_eq!(config.daemon.timeout_secs, 30);
        assert_eq!(config.defaults, AddressDefaults::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.yaml");

        let mut config = Config::default();
        config.defaults.org = Some("acme".to_string());
        config.daemon.timeout_secs = 5;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.defaults.org.as_deref(), Some("acme"));
        assert_eq!(loaded.daemon.timeout_secs, 5);
        assert_eq!(loaded.defaults.service, vec!["default"]);
    }

    #[test]
    fn test_partial_yaml_keeps_field_defaults() {
        let config: Config = serde_yaml::from_str("defaults:\n  project: api\n").unwrap();
        assert_eq!(config.defaults.project.as_deref(), Some("api"));
        assert_eq!(config.defaults.instance, vec!["*"]);
        assert_eq!(config.daemon.timeout_secs, 30);
    }

    #[test]
    fn test_dir_prefs_found_from_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(DIR_PREFS_FILE),
            "org: acme\nproject: api\nenvironment: dev-alice\n",
        )
        .unwrap();
        let nested = dir.path().join("src/bin");
        std::fs::create_dir_all(&nested).unwrap();

        let (_, prefs) = DirPrefs::find(&nested).unwrap().unwrap();
        assert_eq!(prefs.org.as_deref(), Some("acme"));

        let mut defaults = AddressDefaults::default();
        defaults.apply_dir_prefs(&prefs);
        assert_eq!(defaults.project.as_deref(), Some("api"));
        assert_eq!(defaults.environment, vec!["dev-alice"]);
        assert_eq!(defaults.service, vec!["default"]);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("STRONGBOX_ORG", "acme"),
            ("STRONGBOX_ENVIRONMENT", "dev, staging"),
            ("STRONGBOX_SERVICE", "  "),
        ]
        .into_iter()
        .collect();

        let mut defaults = AddressDefaults::default();
        defaults.apply_env(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(defaults.org.as_deref(), Some("acme"));
        assert_eq!(defaults.environment, vec!["dev", "staging"]);
        // Blank values do not clobber the default
        assert_eq!(defaults.service, vec!["default"]);
    }

    #[test]
    fn test_env_separators_only_keep_defaults() {
        for value in [",", " , ", ",,"] {
            let mut defaults = AddressDefaults::default();
            defaults.apply_env(|key| {
                matches!(key, "STRONGBOX_SERVICE" | "STRONGBOX_INSTANCE").then(|| value.to_string())
            });
            assert_eq!(defaults.service, vec!["default"]);
            assert_eq!(defaults.instance, vec!["*"]);
        }
    }

    #[test]
    fn test_resolve_layers() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::rooted(dir.path());
        let mut global = Config::default();
        global.defaults.org = Some("global-org".to_string());
        global.defaults.project = Some("global-project".to_string());
        global.save_to(&paths.config_file()).unwrap();

        let work = dir.path().join("work");
        std::fs::create_dir_all(&work).unwrap();
        std::fs::write(work.join(DIR_PREFS_FILE), "project: local-project\n").unwrap();

        let config = Config::resolve(&paths, &work).unwrap();
        assert_eq!(config.defaults.project.as_deref(), Some("local-project"));
        assert_eq!(config.socket_path(&paths), paths.socket());
    }
}
