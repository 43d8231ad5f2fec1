//! InMemoryCompletionStore - 開発用・テスト用の完了ストア
//!
//! Nothing survives the process, so reruns are only cheap within one
//! `Engine` instance. Used by tests and by one-shot CLI runs.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::completion::CompletionMeta;
use crate::domain::errors::StoreError;
use crate::domain::task::TaskKey;
use crate::ports::CompletionStore;

#[derive(Debug, Default)]
pub struct InMemoryCompletionStore {
    records: RwLock<HashMap<TaskKey, CompletionMeta>>,
}

impl InMemoryCompletionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl CompletionStore for InMemoryCompletionStore {
    async fn record(&self, key: &TaskKey) -> Result<Option<CompletionMeta>, StoreError> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn mark_done(&self, key: &TaskKey, meta: CompletionMeta) -> Result<(), StoreError> {
        self.records.write().await.insert(key.clone(), meta);
        Ok(())
    }

    async fn clear(&self, key: &TaskKey) -> Result<bool, StoreError> {
        Ok(self.records.write().await.remove(key).is_some())
    }

    async fn entries(&self) -> Result<Vec<(TaskKey, CompletionMeta)>, StoreError> {
        let mut entries: Vec<_> = self
            .records
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }
}
