//! Dependency resolver: grows the live graph from roots and yielded tasks.
//!
//! Rules:
//! - Nodes are deduplicated by key; a key already in the graph is not
//!   expanded again.
//! - A node the store already satisfies is inserted as `done` and its own
//!   prerequisites are not expanded.
//! - Every expansion ends with a cycle check over the whole graph, so a cycle
//!   is reported before anything in it runs.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::node::TaskNode;
use super::task_graph::TaskGraph;
use crate::domain::errors::{EngineError, StoreError};
use crate::domain::task::{TaskDescriptor, TaskKey};
use crate::ports::{Clock, CompletionStore};
use crate::typed::{CompletionPolicy, TypedRegistry};

pub struct Resolver {
    registry: Arc<TypedRegistry>,
    store: Arc<dyn CompletionStore>,
    clock: Arc<dyn Clock>,
}

enum Visit {
    Enter(TaskDescriptor),
    Exit(TaskKey),
}

impl Resolver {
    pub fn new(
        registry: Arc<TypedRegistry>,
        store: Arc<dyn CompletionStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            store,
            clock,
        }
    }

    /// Insert `roots` and their static closure. Returns the keys added, in
    /// insertion order.
    pub async fn expand(
        &self,
        graph: &mut TaskGraph,
        roots: &[TaskDescriptor],
    ) -> Result<Vec<TaskKey>, EngineError> {
        let added = self.insert_closure(graph, roots).await?;
        graph.check_acyclic()?;
        Ok(added)
    }

    /// Attach tasks yielded by `parent` as its dynamic prerequisites.
    pub async fn incorporate_dynamic(
        &self,
        graph: &mut TaskGraph,
        parent: &TaskKey,
        children: &[TaskDescriptor],
    ) -> Result<Vec<TaskKey>, EngineError> {
        let added = self.insert_closure(graph, children).await?;

        let keys = dedup_keys(children);
        for key in &keys {
            graph.add_dependency(parent, key);
        }
        if let Some(node) = graph.get_mut(parent) {
            node.add_dynamic(keys);
        }

        graph.check_acyclic()?;
        Ok(added)
    }

    async fn insert_closure(
        &self,
        graph: &mut TaskGraph,
        descriptors: &[TaskDescriptor],
    ) -> Result<Vec<TaskKey>, EngineError> {
        let mut queue: VecDeque<TaskDescriptor> = descriptors.iter().cloned().collect();
        let mut added = Vec::new();

        while let Some(desc) = queue.pop_front() {
            if graph.contains(desc.key()) {
                continue;
            }
            let handler = self.registry.resolve(desc.kind())?;
            let key = desc.key().clone();

            if let Some(at) = self.completed_at(&desc).await? {
                debug!(key = %key, "already complete");
                graph.insert(TaskNode::already_complete(desc, handler, at));
            } else {
                let prereqs = handler.requires_dyn(desc.params())?;
                let prereq_keys = dedup_keys(&prereqs);
                for p in &prereq_keys {
                    graph.add_dependency(&key, p);
                }
                graph.insert(TaskNode::pending(desc, handler, prereq_keys));
                queue.extend(prereqs);
            }
            added.push(key);
        }
        Ok(added)
    }

    /// When `desc` was completed, or None if it still needs to run.
    ///
    /// Recorded kinds need a record whose version matches the registered
    /// handler. Aggregate kinds (wrappers) are complete iff all their
    /// children are, checked depth-first; an aggregate that reaches itself
    /// is treated as incomplete so expansion can report the cycle.
    pub async fn completed_at(
        &self,
        desc: &TaskDescriptor,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let mut stack = vec![Visit::Enter(desc.clone())];
        let mut in_progress: HashSet<TaskKey> = HashSet::new();
        let mut finished: HashSet<TaskKey> = HashSet::new();
        let mut latest: Option<DateTime<Utc>> = None;

        while let Some(visit) = stack.pop() {
            let d = match visit {
                Visit::Exit(key) => {
                    in_progress.remove(&key);
                    finished.insert(key);
                    continue;
                }
                Visit::Enter(d) => d,
            };
            if finished.contains(d.key()) {
                continue;
            }
            if !in_progress.insert(d.key().clone()) {
                return Ok(None);
            }
            let Some(handler) = self.registry.get(d.kind().as_str()) else {
                return Ok(None);
            };
            stack.push(Visit::Exit(d.key().clone()));

            match handler.completion(d.params()) {
                CompletionPolicy::Aggregate(children) => {
                    stack.extend(children.into_iter().map(Visit::Enter));
                }
                CompletionPolicy::Recorded => match self.store.record(d.key()).await? {
                    Some(meta) if meta.is_current(handler.version()) => {
                        latest = latest.max(Some(meta.completed_at));
                    }
                    Some(meta) => {
                        warn!(
                            key = %d.key(),
                            recorded = %meta.version,
                            current = handler.version(),
                            "stale completion record, task will run again"
                        );
                        return Ok(None);
                    }
                    None => return Ok(None),
                },
            }
        }

        Ok(Some(latest.unwrap_or_else(|| self.clock.now())))
    }
}

fn dedup_keys(descriptors: &[TaskDescriptor]) -> Vec<TaskKey> {
    let mut keys: Vec<TaskKey> = Vec::with_capacity(descriptors.len());
    for d in descriptors {
        if !keys.contains(d.key()) {
            keys.push(d.key().clone());
        }
    }
    keys
}
