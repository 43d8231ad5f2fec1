//! Engine - 呼び出し側のエントリポイント

use std::sync::Arc;

use tracing::{debug, info};

use super::builder::EngineBuilder;
use super::config::EngineConfig;
use super::scheduler::{RunContext, dedup_roots};
use super::status::{StatusEntry, classify};
use crate::domain::errors::{ConfigurationError, EngineError, StoreError};
use crate::domain::report::{Plan, PlannedTask, RunReport};
use crate::domain::task::{TaskDescriptor, TaskKey};
use crate::graph::{Resolver, TaskGraph};
use crate::ports::{Clock, CompletionStore, EventSink, IdGenerator};
use crate::typed::TypedRegistry;

/// Holds registry, store and ports. No per-run state lives here: every
/// `run` builds a fresh `RunContext`.
pub struct Engine {
    pub(crate) registry: Arc<TypedRegistry>,
    pub(crate) store: Arc<dyn CompletionStore>,
    pub(crate) sink: Arc<dyn EventSink>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) ids: Arc<dyn IdGenerator>,
    pub(crate) config: EngineConfig,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Execute `roots` and everything they need.
    ///
    /// Task failures are reported inside the `RunReport`; `Err` means the
    /// run itself could not be carried out (bad graph, broken store).
    pub async fn run(&self, roots: &[TaskDescriptor]) -> Result<RunReport, EngineError> {
        let run_id = self.ids.generate_run_id();
        let ctx = RunContext::new(
            run_id,
            self.resolver(),
            Arc::clone(&self.store),
            Arc::clone(&self.sink),
            Arc::clone(&self.clock),
            self.config.failure_mode,
        );
        ctx.run(roots, self.config.workers).await
    }

    /// Static expansion only. Nothing executes and nothing is recorded.
    pub async fn plan(&self, roots: &[TaskDescriptor]) -> Result<Plan, EngineError> {
        let mut graph = TaskGraph::new();
        self.resolver().expand(&mut graph, roots).await?;

        let order = graph.topological_order().ok_or_else(|| {
            ConfigurationError::Invalid("plan could not be ordered".to_string())
        })?;
        let tasks = order
            .iter()
            .filter_map(|key| graph.get(key))
            .map(|node| PlannedTask {
                key: node.key().clone(),
                kind: node.descriptor.kind().clone(),
                status: node.status,
                prerequisites: node.static_prereqs.clone(),
            })
            .collect();

        debug!(nodes = graph.len(), "plan built");
        Ok(Plan {
            roots: dedup_roots(roots),
            tasks,
        })
    }

    /// Forget that `key` was completed. Returns whether a record existed.
    pub async fn clear(&self, key: &TaskKey) -> Result<bool, StoreError> {
        let removed = self.store.clear(key).await?;
        if removed {
            info!(key = %key, "completion record cleared");
        }
        Ok(removed)
    }

    /// Every completion record, classified against the registered kinds.
    pub async fn status(&self) -> Result<Vec<StatusEntry>, StoreError> {
        let entries = self.store.entries().await?;
        Ok(classify(&self.registry, entries))
    }

    pub fn store(&self) -> &Arc<dyn CompletionStore> {
        &self.store
    }

    pub fn registry(&self) -> &TypedRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn resolver(&self) -> Resolver {
        Resolver::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
        )
    }
}
