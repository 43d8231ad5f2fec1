//! CompletionStore port - 「完了済み」の正本（source of truth）
//!
//! # Contract
//! - A record exists only for identities whose work finished successfully.
//! - `mark_done` is atomic per identity: after a crash the record is either
//!   fully present or absent.
//! - Reads may run concurrently with each other.
//!
//! # Implementations
//! - `InMemoryCompletionStore` (tests, one-shot runs)
//! - `FileCompletionStore` (one marker file per identity)

use async_trait::async_trait;

use crate::domain::completion::CompletionMeta;
use crate::domain::errors::StoreError;
use crate::domain::task::TaskKey;

#[async_trait]
pub trait CompletionStore: Send + Sync {
    /// The completion record for `key`, if any.
    async fn record(&self, key: &TaskKey) -> Result<Option<CompletionMeta>, StoreError>;

    /// Is there a record for `key`? Version staleness is the caller's concern.
    async fn is_done(&self, key: &TaskKey) -> Result<bool, StoreError> {
        Ok(self.record(key).await?.is_some())
    }

    /// Record `key` as done, replacing any previous record.
    async fn mark_done(&self, key: &TaskKey, meta: CompletionMeta) -> Result<(), StoreError>;

    /// Remove the record for `key`. Returns whether one existed.
    async fn clear(&self, key: &TaskKey) -> Result<bool, StoreError>;

    /// All records, sorted by key.
    async fn entries(&self) -> Result<Vec<(TaskKey, CompletionMeta)>, StoreError>;
}
