//! Config - Engine 設定の読み込み
//!
//! Loaded from TOML. Every field has a default, so an empty file (or no file)
//! is a valid configuration:
//!
//! ```toml
//! workers = 4
//! failure_mode = "partial_success"   # or "fail_fast"
//!
//! [store]
//! backend = "file"                   # or "memory"
//! dir = ".strand/completed"
//!
//! [logging]
//! level = "info"
//! format = "pretty"                  # "compact" | "json"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::domain::errors::StoreError;
use crate::impls::{FileCompletionStore, InMemoryCompletionStore};
use crate::ports::CompletionStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Size of the worker pool. Must be at least 1.
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub failure_mode: FailureMode,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            failure_mode: FailureMode::default(),
            store: StoreConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// What happens to independent work after a task fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Keep running everything that does not depend on the failure.
    #[default]
    PartialSuccess,
    /// Stop dispatching; let running tasks finish.
    FailFast,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreConfig {
    #[default]
    Memory,
    File {
        #[serde(default = "default_store_dir")]
        dir: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

fn default_workers() -> usize {
    4
}

fn default_store_dir() -> PathBuf {
    PathBuf::from(".strand/completed")
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse error: {0}")]
    Parse(String),
    #[error("invalid value: {0}")]
    Invalid(String),
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(msg) => {
                ConfigError::Parse(format!("failed to parse {}: {msg}", path.display()))
            }
            other => other,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if let StoreConfig::File { dir } = &self.store
            && dir.as_os_str().is_empty()
        {
            return Err(ConfigError::Invalid("store.dir must not be empty".into()));
        }
        Ok(())
    }

    /// Build the completion store this configuration names.
    pub fn open_store(&self) -> Result<Arc<dyn CompletionStore>, StoreError> {
        Ok(match &self.store {
            StoreConfig::Memory => Arc::new(InMemoryCompletionStore::new()),
            StoreConfig::File { dir } => Arc::new(FileCompletionStore::open(dir)?),
        })
    }
}
