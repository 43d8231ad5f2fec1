//! Domain model (ids, task identity, node status, outcomes, errors, events,
//! reports).
//!
//! Nothing here performs I/O or knows about the scheduler.

pub mod completion;
pub mod errors;
pub mod events;
pub mod ids;
pub mod outcome;
pub mod report;
pub mod state;
pub mod task;

pub use completion::CompletionMeta;
pub use errors::{ConfigurationError, EngineError, ErrorKind, StoreError, TaskError};
pub use events::{EventRecord, RunEvent};
pub use ids::{Id, IdMarker, RunId};
pub use outcome::{Artifact, Outcome};
pub use report::{
    DoneEntry, FailedEntry, Plan, PlannedTask, RunCounts, RunReport, SkippedEntry,
};
pub use state::{NodeStatus, SkipCause};
pub use task::{TaskDescriptor, TaskKey, TaskKind};
