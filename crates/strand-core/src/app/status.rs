//! Status - 完了記録のステータスクエリ

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::completion::CompletionMeta;
use crate::domain::ids::RunId;
use crate::domain::task::TaskKey;
use crate::typed::TypedRegistry;

/// Freshness of one completion record against the registered handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    /// Version matches the registered kind; the task will not run again.
    Current,
    /// Version differs; the task runs again next time it is requested.
    Stale,
    /// No handler is registered for the kind.
    Orphaned,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub key: TaskKey,
    pub version: String,
    pub run_id: RunId,
    pub completed_at: DateTime<Utc>,
    pub state: RecordState,
}

/// The kind part of a key: everything before the parameter list.
pub fn kind_of(key: &TaskKey) -> &str {
    let s = key.as_str();
    s.split_once('(').map_or(s, |(kind, _)| kind)
}

pub(crate) fn classify(
    registry: &TypedRegistry,
    entries: Vec<(TaskKey, CompletionMeta)>,
) -> Vec<StatusEntry> {
    entries
        .into_iter()
        .map(|(key, meta)| {
            let state = match registry.get(kind_of(&key)) {
                Some(h) if meta.is_current(h.version()) => RecordState::Current,
                Some(_) => RecordState::Stale,
                None => RecordState::Orphaned,
            };
            StatusEntry {
                key,
                version: meta.version,
                run_id: meta.run_id,
                completed_at: meta.completed_at,
                state,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typed::Wrapper;
    use chrono::TimeZone;
    use rstest::rstest;
    use ulid::Ulid;

    #[rstest]
    #[case("extract_movie_ids", "extract_movie_ids")]
    #[case(r#"fetch({"page":1})"#, "fetch")]
    fn kind_is_key_prefix(#[case] key: &str, #[case] kind: &str) {
        assert_eq!(kind_of(&TaskKey::new(key)), kind);
    }

    #[test]
    fn records_are_classified_against_registry() {
        let mut registry = TypedRegistry::new();
        registry.register_wrapper(Wrapper::new("w")).unwrap();
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let run = RunId::from_ulid(Ulid::nil());

        let entries = classify(
            &registry,
            vec![
                (TaskKey::new("w"), CompletionMeta::new("wrapper", run, at)),
                (TaskKey::new("w"), CompletionMeta::new("0", run, at)),
                (TaskKey::new("gone"), CompletionMeta::new("1", run, at)),
            ],
        );
        let states: Vec<_> = entries.iter().map(|e| e.state).collect();
        assert_eq!(
            states,
            [RecordState::Current, RecordState::Stale, RecordState::Orphaned]
        );
    }
}
