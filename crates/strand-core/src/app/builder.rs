//! EngineBuilder - Engine の構築とワイヤリング
//!
//! - Builder pattern over registry, store and ports
//! - Fail-fast: `build()` rejects missing kinds and invalid configuration

use std::sync::Arc;

use super::config::{ConfigError, EngineConfig};
use super::engine::Engine;
use crate::domain::errors::StoreError;
use crate::ports::{
    Clock, CompletionStore, EventSink, IdGenerator, NoopEventSink, SystemClock, UlidGenerator,
};
use crate::typed::{DynHandler, Handler, RegistryError, Task, TypedRegistry, Wrapper};

/// Builds an `Engine`.
///
/// # Example
/// ```ignore
/// let engine = Engine::builder()
///     .register::<FetchIds, _>(FetchIdsHandler)?
///     .register_wrapper(Wrapper::new("all").requires([FetchIds.descriptor()?]))?
///     .expect_kinds(&["fetch_ids", "all"])
///     .build()?;
/// ```
///
/// Unset ports default to: store from `config.store`, `NoopEventSink`,
/// `SystemClock`, ULID run ids from the clock.
pub struct EngineBuilder {
    registry: TypedRegistry,
    expected_kinds: Option<Vec<String>>,
    config: EngineConfig,
    store: Option<Arc<dyn CompletionStore>>,
    sink: Option<Arc<dyn EventSink>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing task kinds: {0:?}. These kinds were expected but not registered.")]
    MissingKinds(Vec<String>),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("could not open completion store: {0}")]
    Store(#[from] StoreError),
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            registry: TypedRegistry::new(),
            expected_kinds: None,
            config: EngineConfig::default(),
            store: None,
            sink: None,
            clock: None,
            ids: None,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    pub fn store(mut self, store: Arc<dyn CompletionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn register<T: Task, H: Handler<T> + 'static>(
        mut self,
        handler: H,
    ) -> Result<Self, RegistryError> {
        self.registry.register::<T, H>(handler)?;
        Ok(self)
    }

    pub fn register_wrapper(mut self, wrapper: Wrapper) -> Result<Self, RegistryError> {
        self.registry.register_wrapper(wrapper)?;
        Ok(self)
    }

    /// Register a hand-written `DynHandler`, for kinds whose prerequisites
    /// or completion rule do not fit `Task` or `Wrapper`.
    pub fn register_dyn(mut self, handler: Arc<dyn DynHandler>) -> Result<Self, RegistryError> {
        self.registry.register_dyn(handler)?;
        Ok(self)
    }

    /// Kinds that must be registered for `build()` to succeed.
    pub fn expect_kinds(mut self, kinds: &[&str]) -> Self {
        self.expected_kinds = Some(kinds.iter().map(|k| k.to_string()).collect());
        self
    }

    pub fn build(self) -> Result<Engine, BuildError> {
        if let Some(expected) = &self.expected_kinds {
            let missing: Vec<String> = expected
                .iter()
                .filter(|k| !self.registry.contains(k))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingKinds(missing));
            }
        }
        self.config.validate()?;

        let store = match self.store {
            Some(store) => store,
            None => self.config.open_store()?,
        };
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids: Arc<dyn IdGenerator> = match self.ids {
            Some(ids) => ids,
            None => Arc::new(UlidGenerator::new(Arc::clone(&clock))),
        };

        Ok(Engine {
            registry: Arc::new(self.registry),
            store,
            sink: self.sink.unwrap_or_else(|| Arc::new(NoopEventSink)),
            clock,
            ids,
            config: self.config,
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::TaskError;
    use crate::domain::outcome::Outcome;
    use crate::domain::task::TaskDescriptor;
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct FetchIds;

    impl Task for FetchIds {
        const KIND: &'static str = "fetch_ids";
    }

    struct FetchIdsHandler;

    #[async_trait]
    impl Handler<FetchIds> for FetchIdsHandler {
        async fn handle(&self, _task: FetchIds) -> Result<Outcome, TaskError> {
            Ok(Outcome::done())
        }
    }

    #[test]
    fn build_success() {
        let engine = EngineBuilder::new()
            .register::<FetchIds, _>(FetchIdsHandler)
            .unwrap()
            .register_wrapper(Wrapper::new("all").requires([TaskDescriptor::bare("fetch_ids")]))
            .unwrap()
            .expect_kinds(&[FetchIds::KIND, "all"])
            .build();
        assert!(engine.is_ok());
    }

    #[test]
    fn build_missing_kinds() {
        let result = EngineBuilder::new()
            .register::<FetchIds, _>(FetchIdsHandler)
            .unwrap()
            .expect_kinds(&[FetchIds::KIND, "fetch_details"])
            .build();
        assert!(matches!(
            result,
            Err(BuildError::MissingKinds(missing)) if missing == vec!["fetch_details".to_string()]
        ));
    }

    #[test]
    fn build_without_expectations() {
        assert!(EngineBuilder::new().build().is_ok());
    }

    #[test]
    fn zero_workers_is_rejected() {
        let result = EngineBuilder::new().workers(0).build();
        assert!(matches!(result, Err(BuildError::InvalidConfig(_))));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let result = EngineBuilder::new()
            .register::<FetchIds, _>(FetchIdsHandler)
            .unwrap()
            .register::<FetchIds, _>(FetchIdsHandler);
        assert!(matches!(result, Err(RegistryError::AlreadyRegistered(_))));
    }
}
