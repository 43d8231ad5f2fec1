//! App - アプリケーション層（Engine と実行ループ）
//!
//! # Components
//! - **EngineBuilder**: wiring and start-up checks
//! - **Engine**: run / plan / clear / status
//! - **RunContext** (scheduler): single writer of the task graph for one run
//! - **WorkerGroup**: bounded pool executing dispatched nodes
//! - **ReadyQueue**: hand-off between scheduler and workers

pub mod builder;
pub mod config;
pub mod engine;
pub mod ready_queue;
mod scheduler;
pub mod status;
pub mod worker;


pub use self::builder::{BuildError, EngineBuilder};
pub use self::config::{ConfigError, EngineConfig, FailureMode, LogFormat, LoggingConfig, StoreConfig};
pub use self::engine::Engine;
pub use self::ready_queue::{Dispatch, ReadyQueue};
pub use self::status::{RecordState, StatusEntry};
pub use self::worker::{WorkerGroup, WorkerMessage};
