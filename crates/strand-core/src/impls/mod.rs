//! Impls - 実装（開発用・テスト用）
//!
//! - **InMemoryCompletionStore**: process-local records
//! - **FileCompletionStore**: one marker file per identity
//! - **InMemoryEventLog**: recording event sink

pub mod event_log;
pub mod file_store;
pub mod memory_store;

pub use self::event_log::InMemoryEventLog;
pub use self::file_store::FileCompletionStore;
pub use self::memory_store::InMemoryCompletionStore;
