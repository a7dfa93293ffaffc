//! Runtime configuration.
//!
//! Resolution, highest priority first: CLI flags (applied by `main`),
//! environment variables, the YAML config file, built-in defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Result, TaskError};
use crate::id::UserId;

pub const ENV_CONFIG: &str = "TASKTREE_CONFIG";
pub const ENV_DB_PATH: &str = "TASKTREE_DB_PATH";
pub const ENV_USER: &str = "TASKTREE_USER";
pub const ENV_LOG: &str = "TASKTREE_LOG";

pub const DEFAULT_USER: UserId = UserId::new(1);
pub const DEFAULT_LOG_LEVEL: &str = "warn";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub db_path: Option<PathBuf>,
    pub user_id: Option<UserId>,
    pub log_level: Option<String>,
}

impl Config {
    /// Load the config file (if any) and apply environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match Self::file_path(explicit, |key| std::env::var(key).ok()) {
            Some(path) if path.exists() => Self::from_file(&path)?,
            Some(path) if explicit.is_some() => {
                return Err(TaskError::InvalidConfig(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Explicit path, then `TASKTREE_CONFIG`, then `<config_dir>/tasktree/config.yaml`
    pub fn file_path(
        explicit: Option<&Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Option<PathBuf> {
        explicit
            .map(Path::to_path_buf)
            .or_else(|| lookup(ENV_CONFIG).map(PathBuf::from))
            .or_else(|| dirs::config_dir().map(|dir| dir.join("tasktree").join("config.yaml")))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&raw)?)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(path) = lookup(ENV_DB_PATH) {
            self.db_path = Some(PathBuf::from(path));
        }
        if let Some(raw) = lookup(ENV_USER) {
            let user: UserId = raw
                .parse()
                .map_err(|e| TaskError::InvalidConfig(format!("{ENV_USER}: {e}")))?;
            self.user_id = Some(user);
        }
        if let Some(level) = lookup(ENV_LOG) {
            self.log_level = Some(level);
        }
        Ok(())
    }

    /// Configured database path, or `.tasktree/tasks.db` under the current directory
    pub fn db_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(|| {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            cwd.join(".tasktree").join("tasks.db")
        })
    }

    pub fn user(&self) -> UserId {
        self.user_id.unwrap_or(DEFAULT_USER)
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }
}
