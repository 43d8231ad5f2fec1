//! TypedRegistry - Handler の登録と管理

use std::collections::HashMap;
use std::sync::Arc;

use super::handler::{DynHandler, Handler, TypedHandler};
use super::task::Task;
use super::wrapper::Wrapper;
use crate::domain::errors::ConfigurationError;
use crate::domain::task::TaskKind;

/// kind ごとに登録された Handler
///
/// Typed handlers go through `TypedHandler` so the map only ever holds
/// `Arc<dyn DynHandler>`.
#[derive(Default, Clone)]
pub struct TypedRegistry {
    handlers: HashMap<String, Arc<dyn DynHandler>>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("handler for task kind '{0}' is already registered")]
    AlreadyRegistered(String),
}

impl From<RegistryError> for ConfigurationError {
    fn from(e: RegistryError) -> Self {
        ConfigurationError::Invalid(e.to_string())
    }
}

impl TypedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Task, H: Handler<T> + 'static>(
        &mut self,
        handler: H,
    ) -> Result<(), RegistryError> {
        self.register_dyn(Arc::new(TypedHandler::<T, H>::new(handler)))
    }

    pub fn register_wrapper(&mut self, wrapper: Wrapper) -> Result<(), RegistryError> {
        self.register_dyn(Arc::new(wrapper))
    }

    pub fn register_dyn(&mut self, handler: Arc<dyn DynHandler>) -> Result<(), RegistryError> {
        let kind = handler.kind().to_string();
        if self.handlers.contains_key(&kind) {
            return Err(RegistryError::AlreadyRegistered(kind));
        }
        self.handlers.insert(kind, handler);
        Ok(())
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn DynHandler>> {
        self.handlers.get(kind).cloned()
    }

    /// Like `get`, but an unknown kind is a configuration error.
    pub fn resolve(&self, kind: &TaskKind) -> Result<Arc<dyn DynHandler>, ConfigurationError> {
        self.get(kind.as_str())
            .ok_or_else(|| ConfigurationError::UnknownKind(kind.clone()))
    }

    /// Registered kinds, sorted.
    pub fn registered_kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.handlers.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }
}
