//! Wrapper - 子タスクを束ねるだけのデータ駆動タスク
//!
//! A wrapper's static `requires` are expanded like any other prerequisite.
//! Its execution does nothing but yield the `yields` list, so it stays
//! `waiting` until those are done too. Completion is never recorded for a
//! wrapper; on a later run it counts as complete iff every child does.

use async_trait::async_trait;
use serde_json::Value;

use super::handler::{CompletionPolicy, DynHandler};
use crate::domain::errors::{ConfigurationError, TaskError};
use crate::domain::outcome::Outcome;
use crate::domain::task::TaskDescriptor;

/// # Example
/// ```ignore
/// let extract_details = Wrapper::new("extract_details")
///     .requires([TaskDescriptor::bare("extract_ids")])
///     .yields([
///         TaskDescriptor::bare("extract_movie_details"),
///         TaskDescriptor::bare("extract_tv_details"),
///     ]);
/// ```
#[derive(Debug, Clone)]
pub struct Wrapper {
    kind: String,
    requires: Vec<TaskDescriptor>,
    yields: Vec<TaskDescriptor>,
}

impl Wrapper {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            requires: Vec::new(),
            yields: Vec::new(),
        }
    }

    pub fn requires(mut self, tasks: impl IntoIterator<Item = TaskDescriptor>) -> Self {
        self.requires.extend(tasks);
        self
    }

    pub fn yields(mut self, tasks: impl IntoIterator<Item = TaskDescriptor>) -> Self {
        self.yields.extend(tasks);
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// `requires` followed by `yields`, deduplicated by key.
    pub fn children(&self) -> Vec<TaskDescriptor> {
        let mut out: Vec<TaskDescriptor> = Vec::new();
        for d in self.requires.iter().chain(self.yields.iter()) {
            if !out.iter().any(|o| o.key() == d.key()) {
                out.push(d.clone());
            }
        }
        out
    }

    pub fn descriptor(&self) -> TaskDescriptor {
        TaskDescriptor::bare(self.kind.clone())
    }
}

#[async_trait]
impl DynHandler for Wrapper {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn version(&self) -> &str {
        "wrapper"
    }

    fn requires_dyn(&self, _params: &Value) -> Result<Vec<TaskDescriptor>, ConfigurationError> {
        Ok(self.requires.clone())
    }

    fn completion(&self, _params: &Value) -> CompletionPolicy {
        CompletionPolicy::Aggregate(self.children())
    }

    async fn handle_dyn(&self, _params: Value) -> Result<Outcome, TaskError> {
        Ok(Outcome::done().yielding_all(self.yields.iter().cloned()))
    }
}
