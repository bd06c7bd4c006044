//! Manager configuration (`modman.toml`).
//!
//! Every field has a default, so an absent or partial file is valid.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use module_fs::ConfigStore;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Default config filename, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "modman.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub paths: PathsConfig,
    pub host: HostConfig,
    pub core: CoreConfig,
    pub releases: ReleaseConfig,
    pub update: UpdateConfig,
    /// Module name to `owner/name`, for modules whose manifest has no
    /// `repository`.
    pub repositories: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub modules_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            modules_dir: PathBuf::from("modules"),
            data_dir: PathBuf::from(".modman"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Runtime binary queried for its version and loaded extensions.
    pub runtime_binary: String,
    pub framework_version: Option<String>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            runtime_binary: "php".to_string(),
            framework_version: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Installed platform version, reported by `core:version`.
    pub version: Option<String>,
    pub repository: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseConfig {
    pub api_base: String,
    /// Environment variable holding an API token, if any.
    pub token_env: Option<String>,
    pub allow_prerelease: bool,
    pub cache_ttl_secs: u64,
    pub user_agent: String,
    pub request_timeout_secs: u64,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            token_env: Some("GITHUB_TOKEN".to_string()),
            allow_prerelease: false,
            cache_ttl_secs: 6 * 60 * 60,
            user_agent: format!("modman/{}", env!("CARGO_PKG_VERSION")),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Fail verification when a release publishes no checksum.
    pub require_checksum: bool,
    /// `{archive}` and `{target}` are substituted.
    pub extract_command: String,
    /// `{module}`, `{version}` and `{path}` are substituted in the hooks.
    pub migrate_command: Option<String>,
    pub seed_command: Option<String>,
    pub health_command: Option<String>,
    pub timeout_secs: u64,
    pub batch_timeout_secs: u64,
    pub check_tries: u32,
    pub check_timeout_secs: u64,
    /// Backups kept per module; older ones are removed after each backup.
    pub keep_backups: usize,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            require_checksum: false,
            extract_command: "unzip -o -q {archive} -d {target}".to_string(),
            migrate_command: None,
            seed_command: None,
            health_command: None,
            timeout_secs: 600,
            batch_timeout_secs: 1800,
            check_tries: 3,
            check_timeout_secs: 120,
            keep_backups: 3,
        }
    }
}

impl UpdateConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_secs)
    }
}

impl ManagerConfig {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
        }
        Ok(ConfigStore::new().load_or_default(path)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        ConfigStore::new().save(path, self)?;
        Ok(())
    }

    /// Resolve relative `paths` against `base`, normally the directory
    /// holding the config file.
    pub fn rooted_at(mut self, base: &Path) -> Self {
        for dir in [&mut self.paths.modules_dir, &mut self.paths.data_dir] {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
        self
    }

    pub fn statuses_path(&self) -> PathBuf {
        self.paths.data_dir.join("module-statuses.json")
    }

    pub fn history_path(&self) -> PathBuf {
        self.paths.data_dir.join("update-history.json")
    }

    pub fn cache_path(&self) -> PathBuf {
        self.paths.data_dir.join("available-updates.json")
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.paths.data_dir.join("backups")
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.paths.data_dir.join("staging")
    }

    /// Per-module ledgers of migrations already run.
    pub fn migrations_dir(&self) -> PathBuf {
        self.paths.data_dir.join("migrations")
    }

    /// Lock files backing job unique keys.
    pub fn locks_dir(&self) -> PathBuf {
        self.paths.data_dir.join("locks")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modman.toml");
        std::fs::write(
            &path,
            r#"
[paths]
modules_dir = "app/modules"

[update]
require_checksum = true

[repositories]
forum = "acme/forum-module"
"#,
        )
        .unwrap();

        let config = ManagerConfig::load(&path).unwrap();
        assert_eq!(config.paths.modules_dir, PathBuf::from("app/modules"));
        assert_eq!(config.paths.data_dir, PathBuf::from(".modman"));
        assert!(config.update.require_checksum);
        assert_eq!(config.update.timeout(), Duration::from_secs(600));
        assert_eq!(config.update.check_tries, 3);
        assert_eq!(config.update.keep_backups, 3);
        assert_eq!(config.releases.api_base, "https://api.github.com");
        assert_eq!(config.repositories["forum"], "acme/forum-module");
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = ManagerConfig::load(&dir.path().join("modman.toml")).unwrap();
        assert_eq!(config, ManagerConfig::default());
        assert_eq!(
            config.history_path(),
            PathBuf::from(".modman/update-history.json")
        );
    }

    #[test]
    fn relative_paths_follow_config_dir() {
        let config = ManagerConfig {
            paths: PathsConfig {
                modules_dir: PathBuf::from("modules"),
                data_dir: PathBuf::from("/var/lib/modman"),
            },
            ..ManagerConfig::default()
        }
        .rooted_at(Path::new("/srv/site"));

        assert_eq!(config.paths.modules_dir, PathBuf::from("/srv/site/modules"));
        assert_eq!(config.paths.data_dir, PathBuf::from("/var/lib/modman"));
        assert_eq!(config.backups_dir(), PathBuf::from("/var/lib/modman/backups"));
        assert_eq!(config.migrations_dir(), PathBuf::from("/var/lib/modman/migrations"));
        assert_eq!(config.locks_dir(), PathBuf::from("/var/lib/modman/locks"));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modman.toml");
        let mut config = ManagerConfig::default();
        config.core.version = Some("3.1.0".into());
        config.save(&path).unwrap();
        assert_eq!(ManagerConfig::load(&path).unwrap(), config);
    }
}
