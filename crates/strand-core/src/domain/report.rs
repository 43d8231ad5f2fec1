//! Run report returned to the caller once a run terminates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::RunId;
use super::state::{NodeStatus, SkipCause};
use super::task::{TaskKey, TaskKind};

/// Per-status node counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub pending: usize,
    pub ready: usize,
    pub running: usize,
    pub waiting: usize,
    pub done: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RunCounts {
    pub fn total(&self) -> usize {
        self.pending
            + self.ready
            + self.running
            + self.waiting
            + self.done
            + self.failed
            + self.skipped
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoneEntry {
    pub key: TaskKey,
    /// False when the node was satisfied by the completion store.
    pub executed: bool,
    /// Sequence number of the event that made this node done.
    pub seq: u64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedEntry {
    pub key: TaskKey,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedEntry {
    pub key: TaskKey,
    pub cause: SkipCause,
}

/// Structured result of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub roots: Vec<TaskKey>,
    /// True iff every root reached `done`.
    pub success: bool,
    /// Ordered by `seq`.
    pub done: Vec<DoneEntry>,
    pub failed: Vec<FailedEntry>,
    pub skipped: Vec<SkippedEntry>,
    pub counts: RunCounts,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn done_entry(&self, key: &str) -> Option<&DoneEntry> {
        self.done.iter().find(|d| d.key.as_str() == key)
    }

    pub fn is_done(&self, key: &str) -> bool {
        self.done_entry(key).is_some()
    }

    pub fn done_keys(&self) -> Vec<&str> {
        self.done.iter().map(|d| d.key.as_str()).collect()
    }

    /// Keys whose work actually ran during this run.
    pub fn executed_keys(&self) -> Vec<&str> {
        self.done
            .iter()
            .filter(|d| d.executed)
            .map(|d| d.key.as_str())
            .collect()
    }

    pub fn failed_keys(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.key.as_str()).collect()
    }

    pub fn skipped_entry(&self, key: &str) -> Option<&SkippedEntry> {
        self.skipped.iter().find(|s| s.key.as_str() == key)
    }

    pub fn skipped_keys(&self) -> Vec<&str> {
        self.skipped.iter().map(|s| s.key.as_str()).collect()
    }
}

/// One node of a static plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedTask {
    pub key: TaskKey,
    pub kind: TaskKind,
    /// `done` if the store already satisfies it, otherwise `pending`.
    pub status: NodeStatus,
    pub prerequisites: Vec<TaskKey>,
}

/// Static expansion of some roots, dependencies first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub roots: Vec<TaskKey>,
    pub tasks: Vec<PlannedTask>,
}

impl Plan {
    pub fn keys(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.key.as_str()).collect()
    }

    pub fn pending(&self) -> impl Iterator<Item = &PlannedTask> {
        self.tasks.iter().filter(|t| t.status == NodeStatus::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ulid::Ulid;

    fn sample() -> RunReport {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        RunReport {
            run_id: RunId::from_ulid(Ulid::nil()),
            roots: vec![TaskKey::new("b"), TaskKey::new("c")],
            success: false,
            done: vec![
                DoneEntry {
                    key: TaskKey::new("x"),
                    executed: false,
                    seq: 1,
                    completed_at: at,
                },
                DoneEntry {
                    key: TaskKey::new("c"),
                    executed: true,
                    seq: 5,
                    completed_at: at,
                },
            ],
            failed: vec![FailedEntry {
                key: TaskKey::new("a"),
                error: "boom".into(),
            }],
            skipped: vec![SkippedEntry {
                key: TaskKey::new("b"),
                cause: SkipCause::UpstreamFailed(TaskKey::new("a")),
            }],
            counts: RunCounts {
                done: 2,
                failed: 1,
                skipped: 1,
                ..RunCounts::default()
            },
        }
    }

    #[test]
    fn accessors() {
        let r = sample();
        assert_eq!(r.done_keys(), ["x", "c"]);
        assert_eq!(r.executed_keys(), ["c"]);
        assert_eq!(r.failed_keys(), ["a"]);
        assert_eq!(r.skipped_keys(), ["b"]);
        assert!(r.is_done("c"));
        assert!(!r.is_done("b"));
        assert_eq!(r.counts.total(), 4);
    }

    #[test]
    fn report_serializes_skip_cause() {
        let v = serde_json::to_value(sample()).unwrap();
        assert_eq!(v["skipped"][0]["cause"]["reason"], "upstream_failed");
        assert_eq!(v["skipped"][0]["cause"]["key"], "a");
        assert_eq!(v["success"], false);
    }
}
