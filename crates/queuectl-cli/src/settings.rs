//! queuectl home directory and the persisted `config.json`.

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, bail};
use queuectl_core::QueueConfig;

pub const HOME_DIR_NAME: &str = ".queuectl";
pub const DB_FILE_NAME: &str = "queuectl.db";
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Where queuectl keeps its database and configuration.
#[derive(Debug, Clone)]
pub struct Home {
    dir: PathBuf,
}

impl Home {
    /// `explicit` if given (flag or `QUEUECTL_HOME`), else `~/.queuectl`.
    pub fn resolve(explicit: Option<PathBuf>) -> anyhow::Result<Self> {
        let dir = match explicit {
            Some(dir) => dir,
            None => dirs::home_dir()
                .context("could not determine the home directory")?
                .join(HOME_DIR_NAME),
        };
        Ok(Self { dir })
    }

    pub fn ensure_exists(&self) -> anyhow::Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))
    }

    pub fn db_path(&self) -> PathBuf {
        self.dir.join(DB_FILE_NAME)
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE_NAME)
    }

    /// Stored configuration, defaults for anything missing.
    pub fn load_config(&self) -> anyhow::Result<QueueConfig> {
        let path = self.config_path();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(QueueConfig::default()),
            Err(e) => return Err(e).with_context(|| format!("failed to read {}", path.display())),
        };
        serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn save_config(&self, config: &QueueConfig) -> anyhow::Result<()> {
        self.ensure_exists()?;
        let path = self.config_path();
        let raw = serde_json::to_string_pretty(config)?;
        fs::write(&path, raw).with_context(|| format!("failed to write {}", path.display()))
    }
}

/// A key accepted by `queuectl config get/set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    MaxRetries,
    BackoffBase,
    WorkerCount,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 3] = [
        ConfigKey::MaxRetries,
        ConfigKey::BackoffBase,
        ConfigKey::WorkerCount,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConfigKey::MaxRetries => "max-retries",
            ConfigKey::BackoffBase => "backoff-base",
            ConfigKey::WorkerCount => "worker-count",
        }
    }

    pub fn get(self, config: &QueueConfig) -> String {
        match self {
            ConfigKey::MaxRetries => config.max_retries.to_string(),
            ConfigKey::BackoffBase => config.backoff_base.to_string(),
            ConfigKey::WorkerCount => config.worker_count.to_string(),
        }
    }

    /// Parse `value` into `config`, then validate the whole config.
    pub fn set(self, config: &mut QueueConfig, value: &str) -> anyhow::Result<()> {
        let value = value.trim();
        match self {
            ConfigKey::MaxRetries => {
                config.max_retries = value
                    .parse()
                    .with_context(|| format!("{self} must be a non-negative integer, got '{value}'"))?;
            }
            ConfigKey::BackoffBase => {
                config.backoff_base = value
                    .parse()
                    .with_context(|| format!("{self} must be a number, got '{value}'"))?;
            }
            ConfigKey::WorkerCount => {
                config.worker_count = value
                    .parse()
                    .with_context(|| format!("{self} must be a positive integer, got '{value}'"))?;
            }
        }
        config.validate()?;
        Ok(())
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match ConfigKey::ALL.into_iter().find(|k| k.as_str() == s) {
            Some(key) => Ok(key),
            None => {
                let valid: Vec<_> = ConfigKey::ALL.iter().map(|k| k.as_str()).collect();
                bail!("unknown config key '{s}' (valid keys: {})", valid.join(", "))
            }
        }
    }
}
