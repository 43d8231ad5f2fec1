//! The live graph of one run: nodes by key plus the edge index.

use std::collections::HashMap;

use super::dependency::DependencyGraph;
use super::node::TaskNode;
use crate::domain::errors::ConfigurationError;
use crate::domain::report::RunCounts;
use crate::domain::state::NodeStatus;
use crate::domain::task::TaskKey;

#[derive(Debug, Default)]
pub struct TaskGraph {
    nodes: HashMap<TaskKey, TaskNode>,
    /// Insertion order, for stable iteration.
    order: Vec<TaskKey>,
    deps: DependencyGraph,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, key: &TaskKey) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn get(&self, key: &TaskKey) -> Option<&TaskNode> {
        self.nodes.get(key)
    }

    pub fn get_mut(&mut self, key: &TaskKey) -> Option<&mut TaskNode> {
        self.nodes.get_mut(key)
    }

    pub fn status(&self, key: &TaskKey) -> Option<NodeStatus> {
        self.nodes.get(key).map(|n| n.status)
    }

    /// Keys in the order nodes were first referenced.
    pub fn keys(&self) -> &[TaskKey] {
        &self.order
    }

    pub fn nodes(&self) -> impl Iterator<Item = &TaskNode> {
        self.order.iter().filter_map(|k| self.nodes.get(k))
    }

    pub fn deps(&self) -> &DependencyGraph {
        &self.deps
    }

    pub(crate) fn insert(&mut self, node: TaskNode) {
        let key = node.key().clone();
        if self.nodes.insert(key.clone(), node).is_none() {
            self.order.push(key);
        }
    }

    pub(crate) fn add_dependency(&mut self, task: &TaskKey, depends_on: &TaskKey) {
        self.deps.add_dependency(task, depends_on);
    }

    /// Every prerequisite (static and dynamic) is done.
    pub fn prerequisites_done(&self, key: &TaskKey) -> bool {
        self.nodes.get(key).is_some_and(|node| {
            node.prerequisites()
                .all(|p| self.status(p) == Some(NodeStatus::Done))
        })
    }

    /// First prerequisite that can no longer be satisfied, if any.
    pub fn unsatisfiable_prerequisite(&self, key: &TaskKey) -> Option<TaskKey> {
        let node = self.nodes.get(key)?;
        node.prerequisites()
            .find(|p| self.status(p).is_some_and(NodeStatus::is_unsatisfiable))
            .cloned()
    }

    pub fn check_acyclic(&self) -> Result<(), ConfigurationError> {
        match self.deps.detect_cycle() {
            Some(cycle) => Err(ConfigurationError::Cycle(cycle)),
            None => Ok(()),
        }
    }

    pub fn topological_order(&self) -> Option<Vec<TaskKey>> {
        self.deps.topological_order(&self.order)
    }

    pub fn counts(&self) -> RunCounts {
        let mut counts = RunCounts::default();
        for node in self.nodes.values() {
            match node.status {
                NodeStatus::Pending => counts.pending += 1,
                NodeStatus::Ready => counts.ready += 1,
                NodeStatus::Running => counts.running += 1,
                NodeStatus::Waiting => counts.waiting += 1,
                NodeStatus::Done => counts.done += 1,
                NodeStatus::Failed => counts.failed += 1,
                NodeStatus::Skipped => counts.skipped += 1,
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::task::TaskDescriptor;
    use crate::typed::Wrapper;
    use std::sync::Arc;

    fn add(graph: &mut TaskGraph, kind: &str, prereqs: &[&str]) {
        let keys: Vec<TaskKey> = prereqs.iter().map(|p| TaskKey::new(*p)).collect();
        for p in &keys {
            graph.add_dependency(&TaskKey::new(kind), p);
        }
        graph.insert(TaskNode::pending(
            TaskDescriptor::bare(kind),
            Arc::new(Wrapper::new(kind)),
            keys,
        ));
    }

    #[test]
    fn readiness_follows_prerequisite_status() {
        let mut g = TaskGraph::new();
        add(&mut g, "a", &[]);
        add(&mut g, "b", &["a"]);

        assert!(g.prerequisites_done(&TaskKey::new("a")));
        assert!(!g.prerequisites_done(&TaskKey::new("b")));

        g.get_mut(&TaskKey::new("a")).unwrap().status = NodeStatus::Done;
        assert!(g.prerequisites_done(&TaskKey::new("b")));
    }

    #[test]
    fn unsatisfiable_prerequisite_is_found() {
        let mut g = TaskGraph::new();
        add(&mut g, "a", &[]);
        add(&mut g, "b", &["a"]);
        assert!(g.unsatisfiable_prerequisite(&TaskKey::new("b")).is_none());

        g.get_mut(&TaskKey::new("a"))
            .unwrap()
            .mark_failed("x".into());
        assert_eq!(
            g.unsatisfiable_prerequisite(&TaskKey::new("b")),
            Some(TaskKey::new("a"))
        );
    }

    #[test]
    fn counts_and_order() {
        let mut g = TaskGraph::new();
        add(&mut g, "root", &["leaf"]);
        add(&mut g, "leaf", &[]);

        let keys: Vec<_> = g.keys().iter().map(TaskKey::as_str).collect();
        assert_eq!(keys, ["root", "leaf"]);

        let topo = g.topological_order().unwrap();
        let topo: Vec<_> = topo.iter().map(TaskKey::as_str).collect();
        assert_eq!(topo, ["leaf", "root"]);

        assert_eq!(g.counts().pending, 2);
        assert!(g.check_acyclic().is_ok());
    }
}
