//! strand-core
//!
//! Dependency-driven task orchestration: declare tasks with prerequisites,
//! ask for roots, and the engine runs whatever is not already complete in
//! dependency order on a bounded worker pool.
//!
//! # Modules
//! - **domain**: task identity, node status, outcomes, errors, events, reports
//! - **ports**: completion store, clock, id generator, event sink
//! - **typed**: `Task` / `Handler<T>` surface, `Wrapper`, `TypedRegistry`
//! - **graph**: live task graph, cycle detection, resolver
//! - **app**: `Engine`, `EngineBuilder`, scheduler and worker pool
//! - **impls**: in-memory and file-backed port implementations

pub mod app;
pub mod domain;
pub mod graph;
pub mod impls;
pub mod ports;
pub mod typed;

pub use app::{BuildError, Engine, EngineBuilder, EngineConfig, FailureMode};
pub use domain::{
    Artifact, ConfigurationError, EngineError, Outcome, RunReport, StoreError, TaskDescriptor,
    TaskError, TaskKey,
};
pub use typed::{Handler, Task, Wrapper};
