//! Scheduler - ルートからレポートまで 1 回の実行を駆動
//!
//! The scheduler loop is the only writer of the graph. Workers receive
//! `Dispatch` values through the ready queue and answer with
//! `WorkerMessage`s; they never see the graph.
//!
//! # Flow
//! 1. Expand the roots (static closure). Configuration errors abort here,
//!    before anything runs.
//! 2. Promote pending nodes whose prerequisites are done and push them to
//!    the ready queue.
//! 3. On `Finished`:
//!    - failure: mark failed, skip everything downstream
//!    - success: attach yielded tasks, then the node waits until every
//!      prerequisite (static and dynamic) is done and completes
//! 4. Stop when nothing is in flight and nothing can be promoted.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::config::FailureMode;
use super::ready_queue::{Dispatch, ReadyQueue};
use super::worker::{WorkerGroup, WorkerMessage};
use crate::domain::completion::CompletionMeta;
use crate::domain::errors::{EngineError, TaskError};
use crate::domain::events::{EventRecord, RunEvent};
use crate::domain::ids::RunId;
use crate::domain::outcome::{Artifact, Outcome};
use crate::domain::report::{DoneEntry, FailedEntry, RunReport, SkippedEntry};
use crate::domain::state::{NodeStatus, SkipCause};
use crate::domain::task::{TaskDescriptor, TaskKey};
use crate::graph::{Resolver, TaskGraph};
use crate::ports::{Clock, CompletionStore, EventSink};
use crate::typed::CompletionPolicy;

/// State owned by one invocation of `Engine::run`.
pub(crate) struct RunContext {
    run_id: RunId,
    graph: TaskGraph,
    resolver: Resolver,
    store: Arc<dyn CompletionStore>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    failure_mode: FailureMode,
    seq: u64,
    /// Dispatched (queued or running) and not yet finished.
    in_flight: usize,
    /// No further dispatch.
    halted: bool,
    fatal: Option<EngineError>,
}

impl RunContext {
    pub(crate) fn new(
        run_id: RunId,
        resolver: Resolver,
        store: Arc<dyn CompletionStore>,
        sink: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        failure_mode: FailureMode,
    ) -> Self {
        Self {
            run_id,
            graph: TaskGraph::new(),
            resolver,
            store,
            sink,
            clock,
            failure_mode,
            seq: 0,
            in_flight: 0,
            halted: false,
            fatal: None,
        }
    }

    pub(crate) async fn run(
        mut self,
        roots: &[TaskDescriptor],
        workers: usize,
    ) -> Result<RunReport, EngineError> {
        let root_keys = dedup_roots(roots);
        info!(run_id = %self.run_id, roots = root_keys.len(), workers, "run started");
        self.emit(RunEvent::RunStarted {
            run_id: self.run_id,
            roots: root_keys.clone(),
        });

        let added = match self.resolver.expand(&mut self.graph, roots).await {
            Ok(added) => added,
            Err(e) => {
                warn!(run_id = %self.run_id, error = %e, "run aborted during expansion");
                self.emit(RunEvent::RunFinished {
                    run_id: self.run_id,
                    success: false,
                });
                return Err(e);
            }
        };
        self.announce_already_complete(&added);

        let queue = Arc::new(ReadyQueue::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let group = WorkerGroup::spawn(workers.max(1), Arc::clone(&queue), tx);

        loop {
            if !self.halted {
                self.promote_ready(&queue).await;
            }
            if self.in_flight == 0 {
                break;
            }
            match rx.recv().await {
                Some(WorkerMessage::Started { key, worker }) => self.on_started(key, worker),
                Some(WorkerMessage::Finished { key, result }) => {
                    self.in_flight -= 1;
                    self.on_finished(key, result, &queue).await;
                }
                None => {
                    self.fatal.get_or_insert(EngineError::WorkersLost);
                    break;
                }
            }
        }

        group.shutdown_and_join().await;
        self.skip_leftovers();

        let success = self.fatal.is_none()
            && root_keys
                .iter()
                .all(|k| self.graph.status(k) == Some(NodeStatus::Done));
        self.emit(RunEvent::RunFinished {
            run_id: self.run_id,
            success,
        });

        if let Some(e) = self.fatal.take() {
            warn!(run_id = %self.run_id, error = %e, "run aborted");
            return Err(e);
        }

        let report = self.report(root_keys, success);
        info!(
            run_id = %self.run_id,
            success,
            done = report.counts.done,
            failed = report.counts.failed,
            skipped = report.counts.skipped,
            "run finished"
        );
        Ok(report)
    }

    fn emit(&mut self, event: RunEvent) -> u64 {
        self.seq += 1;
        let record = EventRecord {
            seq: self.seq,
            at: self.clock.now(),
            event,
        };
        self.sink.emit(&record);
        self.seq
    }

    /// Emit `AlreadyComplete` for freshly inserted nodes the store satisfied.
    fn announce_already_complete(&mut self, added: &[TaskKey]) {
        for key in added {
            if self.graph.status(key) != Some(NodeStatus::Done) {
                continue;
            }
            let seq = self.emit(RunEvent::AlreadyComplete { key: key.clone() });
            let now = self.clock.now();
            if let Some(node) = self.graph.get_mut(key) {
                node.mark_done(seq, now);
            }
        }
    }

    /// Skip blocked nodes, then queue every pending node whose
    /// prerequisites are all done.
    async fn promote_ready(&mut self, queue: &ReadyQueue) {
        self.skip_unsatisfiable();

        let ready: Vec<TaskKey> = self
            .graph
            .nodes()
            .filter(|n| n.status == NodeStatus::Pending)
            .map(|n| n.key().clone())
            .filter(|k| self.graph.prerequisites_done(k))
            .collect();

        for key in ready {
            let Some(node) = self.graph.get_mut(&key) else {
                continue;
            };
            node.mark_ready();
            let dispatch = Dispatch {
                key: key.clone(),
                params: node.descriptor.params().clone(),
                handler: Arc::clone(&node.handler),
            };
            self.emit(RunEvent::Ready { key: key.clone() });
            debug!(key = %key, "dispatching");
            queue.push(dispatch).await;
            self.in_flight += 1;
        }
    }

    fn on_started(&mut self, key: TaskKey, worker: usize) {
        if let Some(node) = self.graph.get_mut(&key) {
            node.mark_running();
        }
        self.emit(RunEvent::Started { key, worker });
    }

    async fn on_finished(
        &mut self,
        key: TaskKey,
        result: Result<Outcome, TaskError>,
        queue: &ReadyQueue,
    ) {
        match result {
            Ok(outcome) => self.on_success(key, outcome, queue).await,
            Err(err) => {
                warn!(key = %key, error = %err, "task failed");
                self.fail(&key, err.message().to_string());
                self.skip_unsatisfiable();
                if self.failure_mode == FailureMode::FailFast {
                    self.halt(queue).await;
                }
            }
        }
    }

    async fn on_success(&mut self, key: TaskKey, outcome: Outcome, queue: &ReadyQueue) {
        for artifact in &outcome.artifacts {
            log_artifact(&key, artifact);
        }

        if outcome.has_yielded() {
            let children: Vec<TaskKey> = outcome.yielded.iter().map(|d| d.key().clone()).collect();
            debug!(key = %key, children = children.len(), "task yielded prerequisites");
            self.emit(RunEvent::Yielded {
                key: key.clone(),
                children,
            });

            match self
                .resolver
                .incorporate_dynamic(&mut self.graph, &key, &outcome.yielded)
                .await
            {
                Ok(added) => self.announce_already_complete(&added),
                Err(e) => {
                    warn!(key = %key, error = %e, "dynamic expansion failed");
                    self.fail(&key, e.to_string());
                    self.abort(e, queue).await;
                    return;
                }
            }
        }

        if let Some(node) = self.graph.get_mut(&key) {
            node.mark_waiting();
        }
        self.try_complete(key, queue).await;
    }

    /// Complete `key` if it is waiting and every prerequisite is done, then
    /// cascade to waiting dependents.
    async fn try_complete(&mut self, key: TaskKey, queue: &ReadyQueue) {
        let mut work = vec![key];
        while let Some(key) = work.pop() {
            let Some(node) = self.graph.get(&key) else {
                continue;
            };
            if node.status != NodeStatus::Waiting || !self.graph.prerequisites_done(&key) {
                continue;
            }

            let now = self.clock.now();
            if node.handler.completion(node.descriptor.params()) == CompletionPolicy::Recorded {
                let meta = CompletionMeta::new(node.handler.version(), self.run_id, now);
                if let Err(e) = self.store.mark_done(&key, meta).await {
                    warn!(key = %key, error = %e, "could not record completion");
                    self.fail(&key, e.to_string());
                    self.abort(e.into(), queue).await;
                    return;
                }
            }

            let seq = self.emit(RunEvent::Done { key: key.clone() });
            if let Some(node) = self.graph.get_mut(&key) {
                node.mark_done(seq, now);
            }
            debug!(key = %key, seq, "task done");

            for dependent in self.graph.deps().get_waiting_tasks(&key) {
                if self.graph.status(&dependent) == Some(NodeStatus::Waiting) {
                    work.push(dependent);
                }
            }
        }
    }

    fn fail(&mut self, key: &TaskKey, error: String) {
        if let Some(node) = self.graph.get_mut(key) {
            node.mark_failed(error.clone());
        }
        self.emit(RunEvent::Failed {
            key: key.clone(),
            error,
        });
    }

    fn skip(&mut self, key: &TaskKey, cause: SkipCause) {
        if let Some(node) = self.graph.get_mut(key) {
            node.mark_skipped(cause.clone());
        }
        debug!(key = %key, cause = %cause, "task skipped");
        self.emit(RunEvent::Skipped {
            key: key.clone(),
            cause,
        });
    }

    /// Skip pending or waiting nodes with a failed or skipped prerequisite,
    /// until nothing changes.
    fn skip_unsatisfiable(&mut self) {
        loop {
            let blocked: Vec<(TaskKey, TaskKey)> = self
                .graph
                .nodes()
                .filter(|n| matches!(n.status, NodeStatus::Pending | NodeStatus::Waiting))
                .filter_map(|n| {
                    self.graph
                        .unsatisfiable_prerequisite(n.key())
                        .map(|bad| (n.key().clone(), bad))
                })
                .collect();
            if blocked.is_empty() {
                break;
            }
            for (key, bad) in blocked {
                let cause = self.upstream_cause(&bad);
                self.skip(&key, cause);
            }
        }
    }

    /// The cause to hand down from an unsatisfiable prerequisite.
    fn upstream_cause(&self, prereq: &TaskKey) -> SkipCause {
        match self.graph.get(prereq) {
            Some(node) if node.status == NodeStatus::Skipped => node
                .skip_cause
                .clone()
                .unwrap_or(SkipCause::UpstreamFailed(prereq.clone())),
            _ => SkipCause::UpstreamFailed(prereq.clone()),
        }
    }

    /// Stop dispatching and take undispatched work back out of the queue.
    async fn halt(&mut self, queue: &ReadyQueue) {
        if !self.halted {
            info!(run_id = %self.run_id, "halting dispatch");
        }
        self.halted = true;
        let drained = queue.drain().await;
        self.in_flight -= drained.len();
        for dispatch in drained {
            self.skip(&dispatch.key, SkipCause::Cancelled);
        }
    }

    /// Record a fatal error (the first one wins) and halt.
    async fn abort(&mut self, error: EngineError, queue: &ReadyQueue) {
        self.fatal.get_or_insert(error);
        self.halt(queue).await;
    }

    /// Anything still not terminal when the loop ends was cut off by a halt.
    fn skip_leftovers(&mut self) {
        self.skip_unsatisfiable();
        let leftovers: Vec<TaskKey> = self
            .graph
            .nodes()
            .filter(|n| !n.status.is_terminal())
            .map(|n| n.key().clone())
            .collect();
        for key in leftovers {
            self.skip(&key, SkipCause::Cancelled);
        }
    }

    fn report(&self, roots: Vec<TaskKey>, success: bool) -> RunReport {
        let mut done = Vec::new();
        let mut failed = Vec::new();
        let mut skipped = Vec::new();

        for node in self.graph.nodes() {
            match node.status {
                NodeStatus::Done => done.push(DoneEntry {
                    key: node.key().clone(),
                    executed: node.executed,
                    seq: node.done_seq.unwrap_or_default(),
                    completed_at: node.completed_at.unwrap_or_else(|| self.clock.now()),
                }),
                NodeStatus::Failed => failed.push(FailedEntry {
                    key: node.key().clone(),
                    error: node.error.clone().unwrap_or_default(),
                }),
                NodeStatus::Skipped => skipped.push(SkippedEntry {
                    key: node.key().clone(),
                    cause: node.skip_cause.clone().unwrap_or(SkipCause::Cancelled),
                }),
                _ => {}
            }
        }
        done.sort_by_key(|d| d.seq);

        RunReport {
            run_id: self.run_id,
            roots,
            success,
            done,
            failed,
            skipped,
            counts: self.graph.counts(),
        }
    }
}

pub(crate) fn dedup_roots(roots: &[TaskDescriptor]) -> Vec<TaskKey> {
    let mut keys: Vec<TaskKey> = Vec::with_capacity(roots.len());
    for r in roots {
        if !keys.contains(r.key()) {
            keys.push(r.key().clone());
        }
    }
    keys
}

fn log_artifact(key: &TaskKey, artifact: &Artifact) {
    match artifact {
        Artifact::Text(text) => debug!(key = %key, text = %text, "artifact"),
        Artifact::FilePath(path) => debug!(key = %key, path = %path, "artifact"),
        Artifact::Url(url) => debug!(key = %key, url = %url, "artifact"),
        Artifact::Json(value) => debug!(key = %key, json = %value, "artifact"),
    }
}
