//! Configuration loading and resolution.
//!
//! Resolution order: CLI arguments → environment variables → XDG paths →
//! built-in defaults. The config file is TOML (`liveroll.toml`).

use lr_common::AppId;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::{CoreError, Result};

/// Environment variable names.
const ENV_CONFIG_PATH: &str = "LIVEROLL_CONFIG";
const ENV_DATA_DIR: &str = "LIVEROLL_DATA_DIR";

/// Standard config file name.
const CONFIG_FILENAME: &str = "liveroll.toml";

/// Application name for XDG directories.
const APP_NAME: &str = "liveroll";

/// Default confirmation window after activation.
///
/// Inherited from the platform's historical 30-second default; not tuned
/// for slow networks, which is why it is configuration rather than a
/// constant.
pub const DEFAULT_CONFIRMATION_WINDOW_SECS: u64 = 30;

/// Default interval between update checks in the watch loop.
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 300;

/// Where a configuration value was found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicitly provided via CLI argument.
    CliArgument,

    /// Set via environment variable.
    Environment,

    /// Found in XDG config directory.
    XdgConfig,

    /// Using built-in defaults.
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliArgument => write!(f, "CLI argument"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG config"),
            ConfigSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

/// Liveroll update configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Application the device updates.
    pub app_id: String,

    /// Distribution endpoint: an HTTP base URL or a local directory path.
    pub endpoint: String,

    /// Seconds after activation within which the new bundle must call
    /// notify-ready or be rolled back.
    #[serde(default = "default_confirmation_window")]
    pub confirmation_window_secs: u64,

    /// Seconds between periodic checks in the watch loop.
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    /// Device data directory override (session record, staged bundles,
    /// event log).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

fn default_confirmation_window() -> u64 {
    DEFAULT_CONFIRMATION_WINDOW_SECS
}

fn default_check_interval() -> u64 {
    DEFAULT_CHECK_INTERVAL_SECS
}

impl UpdateConfig {
    /// Minimal config for an app served from the given endpoint.
    pub fn new(app_id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            endpoint: endpoint.into(),
            confirmation_window_secs: DEFAULT_CONFIRMATION_WINDOW_SECS,
            check_interval_secs: DEFAULT_CHECK_INTERVAL_SECS,
            data_dir: None,
        }
    }

    pub fn app_id(&self) -> AppId {
        AppId::from(self.app_id.as_str())
    }

    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|err| CoreError::Config(format!("{}: {}", path.display(), err)))?;
        toml::from_str(&text)
            .map_err(|err| CoreError::Config(format!("{}: {}", path.display(), err)))
    }

    /// Resolve the device data directory.
    ///
    /// Order: CLI override → `LIVEROLL_DATA_DIR` → config file → XDG data
    /// dir (`.../liveroll/<app_id>`).
    pub fn resolve_data_dir(&self, cli_override: Option<&Path>) -> Result<PathBuf> {
        if let Some(dir) = cli_override {
            return Ok(dir.to_path_buf());
        }
        if let Ok(dir) = std::env::var(ENV_DATA_DIR) {
            if !dir.is_empty() {
                return Ok(PathBuf::from(dir));
            }
        }
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        dirs::data_dir()
            .map(|d| d.join(APP_NAME).join(&self.app_id))
            .ok_or_else(|| CoreError::Config("cannot resolve a data directory".to_string()))
    }
}

/// Locate and load the config file.
///
/// Order: CLI path → `LIVEROLL_CONFIG` → XDG config dir. Returns the
/// loaded config and where it came from. A resolution that finds no file
/// is an error: app id and endpoint have no sensible builtin defaults.
pub fn load_config(cli_path: Option<&Path>) -> Result<(UpdateConfig, ConfigSource)> {
    if let Some(path) = cli_path {
        return Ok((UpdateConfig::from_file(path)?, ConfigSource::CliArgument));
    }
    if let Ok(path) = std::env::var(ENV_CONFIG_PATH) {
        if !path.is_empty() {
            return Ok((
                UpdateConfig::from_file(Path::new(&path))?,
                ConfigSource::Environment,
            ));
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let path = config_dir.join(APP_NAME).join(CONFIG_FILENAME);
        if path.exists() {
            return Ok((UpdateConfig::from_file(&path)?, ConfigSource::XdgConfig));
        }
    }
    Err(CoreError::Config(format!(
        "no {} found (set --config or {})",
        CONFIG_FILENAME, ENV_CONFIG_PATH
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_from_file_applies_defaults() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("liveroll.toml");
        fs::write(
            &path,
            "app_id = \"shop-app\"\nendpoint = \"https://updates.example.com\"\n",
        )
        .expect("write");

        let config = UpdateConfig::from_file(&path).expect("parse");
        assert_eq!(config.app_id, "shop-app");
        assert_eq!(
            config.confirmation_window_secs,
            DEFAULT_CONFIRMATION_WINDOW_SECS
        );
        assert_eq!(config.check_interval_secs, DEFAULT_CHECK_INTERVAL_SECS);
    }

    #[test]
    fn test_from_file_reads_overrides() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("liveroll.toml");
        fs::write(
            &path,
            concat!(
                "app_id = \"shop-app\"\n",
                "endpoint = \"/srv/updates\"\n",
                "confirmation_window_secs = 90\n",
                "data_dir = \"/var/lib/shop-app\"\n",
            ),
        )
        .expect("write");

        let config = UpdateConfig::from_file(&path).expect("parse");
        assert_eq!(config.confirmation_window_secs, 90);
        assert_eq!(
            config.resolve_data_dir(None).expect("data dir"),
            PathBuf::from("/var/lib/shop-app")
        );
    }

    #[test]
    fn test_cli_data_dir_wins() {
        let config = UpdateConfig::new("shop-app", "/srv/updates");
        let dir = config
            .resolve_data_dir(Some(Path::new("/tmp/override")))
            .expect("data dir");
        assert_eq!(dir, PathBuf::from("/tmp/override"));
    }

    #[test]
    fn test_missing_config_file_is_config_error() {
        let err = UpdateConfig::from_file(Path::new("/no/such/liveroll.toml"))
            .expect_err("missing file");
        assert!(matches!(err, CoreError::Config(_)));
    }
}
