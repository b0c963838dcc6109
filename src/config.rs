//! Configuration loading and management.

use crate::query::dates::parse_timezone;
use anyhow::Result;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Default config location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = ".task-lists/config.yaml";

/// Upper bound for list result limits.
pub const MAX_LIST_LIMIT: usize = 1000;

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub user: UserConfig,

    #[serde(default)]
    pub lists: ListsConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Server-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Per-user settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    /// IANA zone name used for relative dates and schedules.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListsConfig {
    /// Row limit when a caller gives none.
    #[serde(default = "default_limit")]
    pub default_limit: usize,
}

impl Default for ListsConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_interval")]
    pub interval_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: default_interval(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".task-lists/tasks.db")
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_limit() -> usize {
    100
}

fn default_true() -> bool {
    true
}

fn default_interval() -> u64 {
    60
}

impl Config {
    /// Load configuration from file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load from `path` (or the default location), falling back to defaults,
    /// then apply environment overrides.
    ///
    /// An explicit path that fails to load is an error. A missing default file
    /// is not, but an unreadable or malformed one is.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load(p)?,
            None => Self::load_if_present(Path::new(DEFAULT_CONFIG_PATH))?,
        };
        config.apply_env();
        Ok(config)
    }

    /// Load `path`, or defaults when the file does not exist.
    pub fn load_if_present(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => serde_yaml::from_str(&content).map_err(|e| {
                warn!(path = %path.display(), error = %e, "Config file is malformed");
                anyhow::Error::from(e)
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Config file is unreadable");
                Err(e.into())
            }
        }
    }

    fn apply_env(&mut self) {
        if let Ok(db_path) = std::env::var("TASK_LISTS_DB_PATH") {
            self.server.db_path = PathBuf::from(db_path);
        }

        if let Ok(tz) = std::env::var("TASK_LISTS_TIMEZONE") {
            self.user.timezone = tz;
        }

        if let Ok(limit) = std::env::var("TASK_LISTS_DEFAULT_LIMIT")
            && let Ok(limit) = limit.parse()
        {
            self.lists.default_limit = limit;
        }
    }

    /// The configured zone, or UTC when the name is unknown.
    pub fn timezone(&self) -> Tz {
        let tz = parse_timezone(&self.user.timezone);
        if tz == Tz::UTC && !self.user.timezone.trim().eq_ignore_ascii_case("utc") {
            warn!(timezone = %self.user.timezone, "Unknown time zone, using UTC");
        }
        tz
    }

    /// Default list limit, clamped to `1..=MAX_LIST_LIMIT`.
    pub fn default_limit(&self) -> usize {
        self.lists.default_limit.clamp(1, MAX_LIST_LIMIT)
    }

    /// Ensure the database directory exists.
    pub fn ensure_db_dir(&self) -> Result<()> {
        if let Some(parent) = self.server.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.server.db_path, PathBuf::from(".task-lists/tasks.db"));
        assert_eq!(config.timezone(), Tz::UTC);
        assert_eq!(config.default_limit(), 100);
        assert!(config.scheduler.enabled);
        assert_eq!(config.scheduler.interval_seconds, 60);
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let config: Config = serde_yaml::from_str(
            "user:\n  timezone: Europe/Berlin\nlists:\n  default_limit: 5000\n",
        )
        .unwrap();
        assert_eq!(config.timezone(), chrono_tz::Europe::Berlin);
        assert_eq!(config.default_limit(), MAX_LIST_LIMIT);
        assert!(config.scheduler.enabled);
    }

    #[test]
    fn unknown_timezone_falls_back_to_utc() {
        let mut config = Config::default();
        config.user.timezone = "Mars/Olympus".into();
        assert_eq!(config.timezone(), Tz::UTC);
    }
}
