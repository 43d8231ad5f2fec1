//! Errors - エラー型と分類
//!
//! - `ConfigurationError`: the graph or its definitions are wrong. Fatal,
//!   raised before the offending subgraph executes.
//! - `TaskError`: one task's own work failed. Localized to that node.
//! - `StoreError`: the completion store cannot be trusted. Fatal for the run.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::task::{TaskKey, TaskKind};

/// Coarse classification used for exit codes and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Execution,
    Store,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("dependency cycle detected: {}", join_keys(.0))]
    Cycle(Vec<TaskKey>),

    #[error("no handler registered for task kind `{0}`")]
    UnknownKind(TaskKind),

    #[error("malformed descriptor for task kind `{kind}`: {reason}")]
    MalformedDescriptor { kind: TaskKind, reason: String },

    #[error("invalid engine configuration: {0}")]
    Invalid(String),
}

fn join_keys(keys: &[TaskKey]) -> String {
    keys.iter()
        .map(TaskKey::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Failure of a task's own execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TaskError {
    message: String,
}

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<std::io::Error> for TaskError {
    fn from(e: std::io::Error) -> Self {
        Self::new(format!("io: {e}"))
    }
}

impl From<serde_json::Error> for TaskError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(format!("json: {e}"))
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("completion store I/O failed at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt completion record at {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("completion store unavailable: {0}")]
    Unavailable(String),
}

/// Error returned by a run. Task failures are not here: they are reported
/// inside the `RunReport`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("scheduler lost contact with its workers")]
    WorkersLost,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Configuration(_) => ErrorKind::Configuration,
            EngineError::Store(_) => ErrorKind::Store,
            EngineError::WorkersLost => ErrorKind::Internal,
        }
    }
}
