//! Outcome model: what a successful execution hands back to the engine.
//!
//! The engine only acts on `yielded`. Artifacts are carried into logs and the
//! event stream for humans; completion is never derived from them.

use serde::{Deserialize, Serialize};

use super::task::TaskDescriptor;

/// A reference to something produced or observed during execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum Artifact {
    /// Free-form text (a summary line, captured output).
    Text(String),

    /// Path to a file produced/used.
    FilePath(String),

    /// URL reference (e.g., a web resource).
    Url(String),

    /// Arbitrary JSON payload.
    Json(serde_json::Value),
}

/// Result of one successful execution.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Outcome {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,

    /// Dynamic prerequisites discovered while running. They must reach `done`
    /// before the yielding task does.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub yielded: Vec<TaskDescriptor>,
}

impl Outcome {
    /// Work finished, nothing further to wait for.
    pub fn done() -> Self {
        Self::default()
    }

    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifacts.push(artifact);
        self
    }

    /// Add one dynamic prerequisite.
    pub fn yielding(mut self, task: TaskDescriptor) -> Self {
        self.yielded.push(task);
        self
    }

    /// Add several dynamic prerequisites.
    pub fn yielding_all(mut self, tasks: impl IntoIterator<Item = TaskDescriptor>) -> Self {
        self.yielded.extend(tasks);
        self
    }

    pub fn has_yielded(&self) -> bool {
        !self.yielded.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn done_yields_nothing() {
        let o = Outcome::done();
        assert!(!o.has_yielded());
        assert!(o.artifacts.is_empty());
    }

    #[test]
    fn yielding_accumulates_in_order() {
        let o = Outcome::done()
            .yielding(TaskDescriptor::bare("a"))
            .yielding_all([TaskDescriptor::bare("b"), TaskDescriptor::bare("c")]);
        let kinds: Vec<_> = o.yielded.iter().map(|d| d.kind().as_str()).collect();
        assert_eq!(kinds, ["a", "b", "c"]);
    }

    #[test]
    fn artifact_is_tagged_enum() {
        let a = Artifact::FilePath("out/ids.json".to_string());
        let v = serde_json::to_value(&a).unwrap();
        assert_eq!(v["kind"], "FilePath");
        assert_eq!(v["value"], "out/ids.json");
    }
}
