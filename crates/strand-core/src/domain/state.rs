//! Node status state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::task::TaskKey;

/// Status of one node within a run.
///
/// State transitions:
/// - Pending -> Ready -> Running -> Done
/// - Running -> Waiting -> Done (task yielded dynamic prerequisites)
/// - Running -> Failed
/// - Pending | Ready | Waiting -> Skipped (upstream failed or run cancelled)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Waiting for prerequisites.
    Pending,

    /// All known prerequisites are done; queued for a worker.
    Ready,

    /// Being executed by a worker.
    Running,

    /// Executed, blocked on the prerequisites it yielded.
    Waiting,

    /// Satisfied, either in this run or per the completion store.
    Done,

    /// Its own work failed.
    Failed,

    /// Can never run in this run.
    Skipped,
}

impl NodeStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, NodeStatus::Done | NodeStatus::Failed | NodeStatus::Skipped)
    }

    /// Did this node end without being satisfied?
    pub fn is_unsatisfiable(self) -> bool {
        matches!(self, NodeStatus::Failed | NodeStatus::Skipped)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeStatus::Pending => "pending",
            NodeStatus::Ready => "ready",
            NodeStatus::Running => "running",
            NodeStatus::Waiting => "waiting",
            NodeStatus::Done => "done",
            NodeStatus::Failed => "failed",
            NodeStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Why a node was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "key", rename_all = "snake_case")]
pub enum SkipCause {
    /// A prerequisite (directly or transitively) failed.
    UpstreamFailed(TaskKey),

    /// Dispatch stopped after a fail-fast failure or a fatal error.
    Cancelled,
}

impl fmt::Display for SkipCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipCause::UpstreamFailed(key) => write!(f, "upstream task {key} failed"),
            SkipCause::Cancelled => f.write_str("run was cancelled"),
        }
    }
}
