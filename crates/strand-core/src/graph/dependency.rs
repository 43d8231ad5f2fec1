//! Dependency graph over task identities.
//!
//! Design:
//! - Forward edges: task -> tasks it depends on (waits for)
//! - Reverse edges: task -> tasks that depend on it (waiting tasks)
//! - Invariant: edges and reverse_edges must be kept in sync

use std::collections::{HashMap, HashSet, VecDeque};

use crate::domain::task::TaskKey;

/// Dependency graph for tracking task dependencies.
///
/// Both directions are kept for cheap lookups:
/// - `edges`: key -> keys it depends on
/// - `reverse_edges`: key -> keys waiting for it
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    edges: HashMap<TaskKey, HashSet<TaskKey>>,
    reverse_edges: HashMap<TaskKey, HashSet<TaskKey>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dependency: `task` depends on `depends_on`.
    ///
    /// Example: add_dependency(b, a) means "B waits for A".
    /// Returns false if the edge already existed.
    pub fn add_dependency(&mut self, task: &TaskKey, depends_on: &TaskKey) -> bool {
        let added = self
            .edges
            .entry(task.clone())
            .or_default()
            .insert(depends_on.clone());
        self.reverse_edges
            .entry(depends_on.clone())
            .or_default()
            .insert(task.clone());
        added
    }

    /// Tasks waiting directly on `key`.
    ///
    /// Returns every waiting task, even those with other unfinished
    /// dependencies. The caller checks readiness.
    pub fn get_waiting_tasks(&self, key: &TaskKey) -> Vec<TaskKey> {
        let mut waiting: Vec<TaskKey> = self
            .reverse_edges
            .get(key)
            .map(|w| w.iter().cloned().collect())
            .unwrap_or_default();
        waiting.sort();
        waiting
    }

    fn sorted_deps_desc(&self, key: &TaskKey) -> Vec<&TaskKey> {
        let mut deps: Vec<&TaskKey> = self
            .edges
            .get(key)
            .map(|d| d.iter().collect())
            .unwrap_or_default();
        deps.sort_by(|a, b| b.cmp(a));
        deps
    }

    /// Detect a cycle in the dependency graph.
    ///
    /// Iterative three-colour DFS over forward edges, O(V + E). Returns the
    /// first cycle found as a closed path (`[a, b, a]`; a self-dependency is
    /// `[a, a]`), or None for a DAG. Start points and neighbours are visited
    /// in key order so the reported path is stable.
    pub fn detect_cycle(&self) -> Option<Vec<TaskKey>> {
        let mut color: HashMap<&TaskKey, Color> = HashMap::new();
        let mut starts: Vec<&TaskKey> = self.edges.keys().collect();
        starts.sort();

        for start in starts {
            if color.get(start).copied().unwrap_or(Color::White) != Color::White {
                continue;
            }
            color.insert(start, Color::Gray);
            let mut stack: Vec<(&TaskKey, Vec<&TaskKey>)> =
                vec![(start, self.sorted_deps_desc(start))];

            while let Some((node, pending)) = stack.last_mut() {
                let Some(dep) = pending.pop() else {
                    color.insert(*node, Color::Black);
                    stack.pop();
                    continue;
                };
                match color.get(dep).copied().unwrap_or(Color::White) {
                    Color::Gray => {
                        let from = stack.iter().position(|(k, _)| *k == dep).unwrap_or(0);
                        let mut cycle: Vec<TaskKey> =
                            stack[from..].iter().map(|(k, _)| (*k).clone()).collect();
                        cycle.push(dep.clone());
                        return Some(cycle);
                    }
                    Color::White => {
                        color.insert(dep, Color::Gray);
                        stack.push((dep, self.sorted_deps_desc(dep)));
                    }
                    Color::Black => {}
                }
            }
        }
        None
    }

    /// Order `nodes` so every key comes after its dependencies (Kahn's
    /// algorithm). Ties keep the order of `nodes`. Edges to keys outside
    /// `nodes` are ignored. Returns None if the nodes contain a cycle.
    pub fn topological_order(&self, nodes: &[TaskKey]) -> Option<Vec<TaskKey>> {
        let index: HashMap<&TaskKey, usize> =
            nodes.iter().enumerate().map(|(i, k)| (k, i)).collect();
        let mut indegree: Vec<usize> = nodes
            .iter()
            .map(|k| {
                self.edges
                    .get(k)
                    .map(|deps| deps.iter().filter(|d| index.contains_key(d)).count())
                    .unwrap_or(0)
            })
            .collect();

        let mut ready: VecDeque<usize> = (0..nodes.len()).filter(|&i| indegree[i] == 0).collect();
        let mut out = Vec::with_capacity(nodes.len());
        while let Some(i) = ready.pop_front() {
            out.push(nodes[i].clone());
            let mut unlocked: Vec<usize> = self
                .reverse_edges
                .get(&nodes[i])
                .map(|w| w.iter().filter_map(|k| index.get(k).copied()).collect())
                .unwrap_or_default();
            unlocked.sort_unstable();
            for j in unlocked {
                indegree[j] -= 1;
                if indegree[j] == 0 {
                    ready.push_back(j);
                }
            }
        }

        (out.len() == nodes.len()).then_some(out)
    }
}
