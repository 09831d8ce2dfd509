//! Runtime configuration
//!
//! Resolution order: `--config PATH`, then `$REPOCHECK_CONFIG`, then
//! [`DEFAULT_CONFIG_PATH`] when it exists, else built-in defaults.
//! `$REPOCHECK_REPORT_FILE` overrides `report_file` in every case.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::policy::CheckSettings;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/repocheck/config.toml";
pub const CONFIG_ENV: &str = "REPOCHECK_CONFIG";
pub const REPORT_FILE_ENV: &str = "REPOCHECK_REPORT_FILE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoCheckConfig {
    /// Root the platform files and repository definitions are read from
    pub sysroot: PathBuf,
    /// Sentinel that turns the whole run into a no-op
    pub skip_file: PathBuf,
    /// JSON-lines failure report, appended to
    pub report_file: Option<PathBuf>,
    /// `stage` field of failure records
    pub stage: String,
    /// Base URL of a mirror carrying `epel-release-latest-*.noarch.rpm`
    pub vendor_mirror: Option<String>,
    /// Kill package manager commands running longer than this
    pub command_timeout_secs: Option<u64>,
    /// Overrides the `uname -m` machine name
    pub machine: Option<String>,
}

impl Default for RepoCheckConfig {
    fn default() -> Self {
        Self {
            sysroot: PathBuf::from("/"),
            skip_file: PathBuf::from("/etc/repocheck/skip"),
            report_file: None,
            stage: "repositories".to_string(),
            vendor_mirror: None,
            command_timeout_secs: None,
            machine: None,
        }
    }
}

impl RepoCheckConfig {
    pub fn from_toml(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents, path)
    }

    /// Load following the resolution order, then apply environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let mut config = match explicit.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::load_from(&path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.is_file() {
                    Self::load_from(default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Some(path) = std::env::var_os(REPORT_FILE_ENV).filter(|v| !v.is_empty()) {
            self.report_file = Some(PathBuf::from(path));
        }
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn check_settings(&self) -> CheckSettings {
        CheckSettings {
            vendor_mirror: self
                .vendor_mirror
                .clone()
                .filter(|mirror| !mirror.trim().is_empty()),
        }
    }
}
