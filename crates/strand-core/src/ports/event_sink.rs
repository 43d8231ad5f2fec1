//! EventSink port - イベント記録の抽象化
//!
//! The scheduler emits one `EventRecord` per node transition. Sinks must not
//! block: `emit` is called from inside the scheduler loop.

use crate::domain::events::EventRecord;

pub trait EventSink: Send + Sync {
    fn emit(&self, record: &EventRecord);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _record: &EventRecord) {}
}
