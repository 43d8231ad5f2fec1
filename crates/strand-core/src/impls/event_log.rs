//! InMemoryEventLog - テスト用のイベント記録
//!
//! Records every event of every run it sees.

use std::sync::Mutex;

use crate::domain::events::{EventRecord, RunEvent};
use crate::ports::EventSink;

#[derive(Debug, Default)]
pub struct InMemoryEventLog {
    records: Mutex<Vec<EventRecord>>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far, in emission order.
    pub fn records(&self) -> Vec<EventRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn clear(&self) {
        match self.records.lock() {
            Ok(mut records) => records.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }

    /// Seq of the first event for `key` matching `pred`.
    pub fn seq_of(&self, key: &str, pred: impl Fn(&RunEvent) -> bool) -> Option<u64> {
        self.records()
            .into_iter()
            .find(|r| r.event.key().map(|k| k.as_str()) == Some(key) && pred(&r.event))
            .map(|r| r.seq)
    }

    pub fn done_seq(&self, key: &str) -> Option<u64> {
        self.seq_of(key, |e| matches!(e, RunEvent::Done { .. }))
    }

    pub fn started_seq(&self, key: &str) -> Option<u64> {
        self.seq_of(key, |e| matches!(e, RunEvent::Started { .. }))
    }

    /// Keys that were handed to a worker, in start order.
    pub fn started_keys(&self) -> Vec<String> {
        self.records()
            .into_iter()
            .filter_map(|r| match r.event {
                RunEvent::Started { key, .. } => Some(key.as_str().to_string()),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for InMemoryEventLog {
    fn emit(&self, record: &EventRecord) {
        match self.records.lock() {
            Ok(mut records) => records.push(record.clone()),
            Err(poisoned) => poisoned.into_inner().push(record.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::task::TaskKey;
    use chrono::Utc;

    fn rec(seq: u64, event: RunEvent) -> EventRecord {
        EventRecord {
            seq,
            at: Utc::now(),
            event,
        }
    }

    #[test]
    fn finds_sequence_numbers_by_key() {
        let log = InMemoryEventLog::new();
        log.emit(&rec(
            1,
            RunEvent::Started {
                key: TaskKey::new("a"),
                worker: 0,
            },
        ));
        log.emit(&rec(
            2,
            RunEvent::Done {
                key: TaskKey::new("a"),
            },
        ));
        log.emit(&rec(
            3,
            RunEvent::Started {
                key: TaskKey::new("b"),
                worker: 1,
            },
        ));

        assert_eq!(log.started_seq("a"), Some(1));
        assert_eq!(log.done_seq("a"), Some(2));
        assert_eq!(log.done_seq("b"), None);
        assert_eq!(log.started_keys(), ["a", "b"]);

        log.clear();
        assert!(log.records().is_empty());
    }
}
