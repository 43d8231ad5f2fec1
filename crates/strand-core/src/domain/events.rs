//! Events - 実行イベント
//!
//! One record per status transition, in scheduler order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::RunId;
use super::state::SkipCause;
use super::task::TaskKey;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted { run_id: RunId, roots: Vec<TaskKey> },
    AlreadyComplete { key: TaskKey },
    Ready { key: TaskKey },
    Started { key: TaskKey, worker: usize },
    Yielded { key: TaskKey, children: Vec<TaskKey> },
    Done { key: TaskKey },
    Failed { key: TaskKey, error: String },
    Skipped { key: TaskKey, cause: SkipCause },
    RunFinished { run_id: RunId, success: bool },
}

impl RunEvent {
    /// The node this event is about, if any.
    pub fn key(&self) -> Option<&TaskKey> {
        match self {
            RunEvent::RunStarted { .. } | RunEvent::RunFinished { .. } => None,
            RunEvent::AlreadyComplete { key }
            | RunEvent::Ready { key }
            | RunEvent::Started { key, .. }
            | RunEvent::Yielded { key, .. }
            | RunEvent::Done { key }
            | RunEvent::Failed { key, .. }
            | RunEvent::Skipped { key, .. } => Some(key),
        }
    }
}

/// An event stamped with its position in the run.
///
/// `seq` is strictly increasing within a run; wall-clock `at` may tie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub seq: u64,
    pub at: DateTime<Utc>,
    pub event: RunEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_with_snake_case_tag() {
        let e = RunEvent::Started {
            key: TaskKey::new("extract_tv_ids"),
            worker: 2,
        };
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["event"], "started");
        assert_eq!(v["key"], "extract_tv_ids");
        assert_eq!(v["worker"], 2);
    }

    #[test]
    fn key_accessor() {
        let e = RunEvent::Done {
            key: TaskKey::new("a"),
        };
        assert_eq!(e.key().map(TaskKey::as_str), Some("a"));

        let e = RunEvent::RunFinished {
            run_id: RunId::from_ulid(ulid::Ulid::nil()),
            success: true,
        };
        assert!(e.key().is_none());
    }
}
