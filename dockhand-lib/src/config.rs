//! Agent configuration: JSON file with generated defaults, overridden by
//! environment variables.
//!
//! Load order: defaults → config file → environment. The merged view is
//! written back to the file so operators always see the effective
//! configuration. An unparseable environment value logs an error and
//! falls back to the configured value rather than failing startup.

use std::env;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub enable_backup: bool,
    pub enable_monitor: bool,
    pub monitor_interval_seconds: u64,
    /// Consecutive samples required before the monitor commits a
    /// classification change.
    pub monitor_retries: usize,
    /// Hours of the day (0-23) at which a backup run triggers.
    pub backup_hours: Vec<u32>,
    pub retention_hours: u64,
    pub concurrent_backup_containers: usize,
    /// Backup staging path inside the management container; must be
    /// bind-mounted from the host.
    pub backup_path: PathBuf,
    pub logs_path: PathBuf,
    pub before_backup_cmd: String,
    pub after_backup_cmd: String,
    /// Name fragment identifying the management container itself.
    pub management_name_marker: String,
    pub helper_image: String,
    pub backup_on_startup: bool,
    pub self_test_on_startup: bool,
    pub notify_level: String,
    pub telegram_bot_token: String,
    pub telegram_chat_ids: Vec<i64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            enable_backup: false,
            enable_monitor: false,
            monitor_interval_seconds: 60,
            monitor_retries: 5,
            backup_hours: Vec::new(),
            retention_hours: 24 * 5,
            concurrent_backup_containers: default_concurrency(),
            backup_path: PathBuf::from("/opt/dockhand/backup"),
            logs_path: PathBuf::from("/opt/dockhand/logs"),
            before_backup_cmd: String::new(),
            after_backup_cmd: String::new(),
            management_name_marker: "dockhand".to_string(),
            helper_image: "debian:latest".to_string(),
            backup_on_startup: false,
            self_test_on_startup: true,
            notify_level: "info".to_string(),
            telegram_bot_token: String::new(),
            telegram_chat_ids: Vec::new(),
        }
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() / 2)
        .unwrap_or(1)
        .max(1)
}

impl AgentConfig {
    /// Load the configuration from `path`, generating the file with
    /// defaults if it does not exist, then apply environment overrides
    /// and persist the merged result.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            info!(path = %path.display(), "config file not found, generating defaults");
            Self::default()
        };

        config.apply_env_overrides();
        config.save(path)?;
        info!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        let contents = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, contents).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_env_overrides(&mut self) {
        override_bool("ENABLE_BACKUP", &mut self.enable_backup);
        override_bool("ENABLE_MONITOR", &mut self.enable_monitor);
        override_bool("BACKUP_ON_STARTUP", &mut self.backup_on_startup);
        override_bool("SELF_TEST_ON_STARTUP", &mut self.self_test_on_startup);

        override_parsed("MONITOR_INTERVAL_SECONDS", &mut self.monitor_interval_seconds);
        override_parsed("MONITOR_RETRIES", &mut self.monitor_retries);
        override_parsed("RETENTION_HOURS", &mut self.retention_hours);
        override_parsed(
            "CONCURRENT_BACKUP_CONTAINERS",
            &mut self.concurrent_backup_containers,
        );

        override_path("BACKUP_PATH", &mut self.backup_path);
        override_path("LOGS_PATH", &mut self.logs_path);
        override_string("BEFORE_BACKUP_CMD", &mut self.before_backup_cmd);
        override_string("AFTER_BACKUP_CMD", &mut self.after_backup_cmd);
        override_string("MANAGEMENT_NAME_MARKER", &mut self.management_name_marker);
        override_string("HELPER_IMAGE", &mut self.helper_image);
        override_string("NOTIFY_LEVEL", &mut self.notify_level);
        override_string("TELEGRAM_BOT_TOKEN", &mut self.telegram_bot_token);

        override_list("BACKUP_HOURS", &mut self.backup_hours);
        override_list("TELEGRAM_CHAT_IDS", &mut self.telegram_chat_ids);
    }
}

fn override_bool(var: &str, slot: &mut bool) {
    let Ok(value) = env::var(var) else { return };
    match value.to_lowercase().as_str() {
        "true" => *slot = true,
        "false" => *slot = false,
        other => {
            error!(%var, value = other, "unparseable boolean environment variable, keeping configured value");
        }
    }
}

fn override_parsed<T>(var: &str, slot: &mut T)
where
    T: FromStr,
    T::Err: Display,
{
    let Ok(value) = env::var(var) else { return };
    match value.parse() {
        Ok(parsed) => *slot = parsed,
        Err(e) => {
            error!(%var, %value, error = %e, "unparseable environment variable, keeping configured value");
        }
    }
}

fn override_string(var: &str, slot: &mut String) {
    if let Ok(value) = env::var(var) {
        if !value.is_empty() {
            *slot = value;
        }
    }
}

fn override_path(var: &str, slot: &mut PathBuf) {
    if let Ok(value) = env::var(var) {
        if !value.is_empty() {
            *slot = PathBuf::from(value);
        }
    }
}

/// Lists arrive as "[1, 2, 3]" or "1,2,3"; one bad element rejects the
/// whole variable.
fn override_list<T>(var: &str, slot: &mut Vec<T>)
where
    T: FromStr,
    T::Err: Display,
{
    let Ok(value) = env::var(var) else { return };
    let cleaned = value.replace(['[', ']', ' '], "");
    if cleaned.is_empty() {
        return;
    }

    let mut parsed = Vec::new();
    for element in cleaned.split(',') {
        match element.parse() {
            Ok(item) => parsed.push(item),
            Err(e) => {
                error!(%var, %value, error = %e, "unparseable list environment variable, keeping configured value");
                return;
            }
        }
    }
    *slot = parsed;
}
