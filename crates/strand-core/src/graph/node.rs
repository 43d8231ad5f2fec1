//! Task node: descriptor + run-local state.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::state::{NodeStatus, SkipCause};
use crate::domain::task::{TaskDescriptor, TaskKey};
use crate::typed::DynHandler;

/// One node of the live graph.
///
/// Design:
/// - This is the single source of truth for a node's status within a run.
/// - The ready queue and worker messages carry keys and clones only.
/// - All state transitions happen here.
pub struct TaskNode {
    pub descriptor: TaskDescriptor,
    pub handler: Arc<dyn DynHandler>,
    pub status: NodeStatus,

    /// Known before the task runs.
    pub static_prereqs: Vec<TaskKey>,

    /// Yielded by the task while running.
    pub dynamic_prereqs: Vec<TaskKey>,

    /// Whether the node's own work ran in this run.
    pub executed: bool,

    pub error: Option<String>,
    pub skip_cause: Option<SkipCause>,

    /// Seq of the event that made this node done.
    pub done_seq: Option<u64>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskNode {
    pub fn pending(
        descriptor: TaskDescriptor,
        handler: Arc<dyn DynHandler>,
        static_prereqs: Vec<TaskKey>,
    ) -> Self {
        Self {
            descriptor,
            handler,
            status: NodeStatus::Pending,
            static_prereqs,
            dynamic_prereqs: Vec::new(),
            executed: false,
            error: None,
            skip_cause: None,
            done_seq: None,
            completed_at: None,
        }
    }

    /// A node the completion store already satisfies. Its prerequisites are
    /// never expanded.
    pub fn already_complete(
        descriptor: TaskDescriptor,
        handler: Arc<dyn DynHandler>,
        completed_at: DateTime<Utc>,
    ) -> Self {
        let mut node = Self::pending(descriptor, handler, Vec::new());
        node.status = NodeStatus::Done;
        node.completed_at = Some(completed_at);
        node
    }

    pub fn key(&self) -> &TaskKey {
        self.descriptor.key()
    }

    /// Static followed by dynamic prerequisites.
    pub fn prerequisites(&self) -> impl Iterator<Item = &TaskKey> {
        self.static_prereqs.iter().chain(self.dynamic_prereqs.iter())
    }

    pub fn mark_ready(&mut self) {
        self.status = NodeStatus::Ready;
    }

    pub fn mark_running(&mut self) {
        self.status = NodeStatus::Running;
        self.executed = true;
    }

    /// Record yielded prerequisites. Duplicates of existing ones are ignored.
    pub fn add_dynamic(&mut self, keys: impl IntoIterator<Item = TaskKey>) {
        for key in keys {
            if !self.static_prereqs.contains(&key) && !self.dynamic_prereqs.contains(&key) {
                self.dynamic_prereqs.push(key);
            }
        }
    }

    pub fn mark_waiting(&mut self) {
        self.status = NodeStatus::Waiting;
    }

    pub fn mark_done(&mut self, seq: u64, at: DateTime<Utc>) {
        self.status = NodeStatus::Done;
        self.done_seq = Some(seq);
        self.completed_at.get_or_insert(at);
    }

    pub fn mark_failed(&mut self, error: String) {
        self.status = NodeStatus::Failed;
        self.error = Some(error);
    }

    pub fn mark_skipped(&mut self, cause: SkipCause) {
        self.status = NodeStatus::Skipped;
        self.skip_cause = Some(cause);
    }
}

impl fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskNode")
            .field("key", self.key())
            .field("status", &self.status)
            .field("static_prereqs", &self.static_prereqs)
            .field("dynamic_prereqs", &self.dynamic_prereqs)
            .field("executed", &self.executed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typed::Wrapper;
    use chrono::TimeZone;

    fn node(kind: &str, prereqs: &[&str]) -> TaskNode {
        TaskNode::pending(
            TaskDescriptor::bare(kind),
            Arc::new(Wrapper::new(kind)),
            prereqs.iter().map(|p| TaskKey::new(*p)).collect(),
        )
    }

    #[test]
    fn walks_through_the_happy_path() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut n = node("w", &["a"]);
        assert_eq!(n.status, NodeStatus::Pending);

        n.mark_ready();
        n.mark_running();
        assert!(n.executed);

        n.add_dynamic([TaskKey::new("a"), TaskKey::new("b"), TaskKey::new("b")]);
        n.mark_waiting();
        let prereqs: Vec<_> = n.prerequisites().map(TaskKey::as_str).collect();
        assert_eq!(prereqs, ["a", "b"]);

        n.mark_done(7, at);
        assert_eq!(n.status, NodeStatus::Done);
        assert_eq!(n.done_seq, Some(7));
        assert_eq!(n.completed_at, Some(at));
    }

    #[test]
    fn already_complete_keeps_recorded_time() {
        let recorded = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut n = TaskNode::already_complete(
            TaskDescriptor::bare("a"),
            Arc::new(Wrapper::new("a")),
            recorded,
        );
        assert_eq!(n.status, NodeStatus::Done);
        assert!(!n.executed);

        n.mark_done(1, later);
        assert_eq!(n.completed_at, Some(recorded));
    }

    #[test]
    fn failure_and_skip_keep_their_cause() {
        let mut a = node("a", &[]);
        a.mark_failed("boom".into());
        assert_eq!(a.error.as_deref(), Some("boom"));

        let mut b = node("b", &["a"]);
        b.mark_skipped(SkipCause::UpstreamFailed(TaskKey::new("a")));
        assert!(b.status.is_unsatisfiable());
    }
}
