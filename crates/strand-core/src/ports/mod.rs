//! Ports - 抽象化レイヤー
//!
//! Each trait here is a seam the engine talks through: completion storage,
//! time, id generation and event delivery. Implementations live in `impls`
//! (or in this module when they are trivial).

pub mod clock;
pub mod completion_store;
pub mod event_sink;
pub mod id_generator;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::completion_store::CompletionStore;
pub use self::event_sink::{EventSink, NoopEventSink};
pub use self::id_generator::{IdGenerator, UlidGenerator};
