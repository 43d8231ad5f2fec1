//! Task - kind・識別子・型消去された descriptor

use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::ConfigurationError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskKind(String);

impl TaskKind {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Deterministic identity of a unit of work.
///
/// Two descriptors with the same key are interchangeable: executing one
/// satisfies the other. The key is derived from the kind plus the canonical
/// JSON form of the parameters (object keys sorted), so field order in the
/// input never changes it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskKey(String);

impl TaskKey {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Derive the identity for `kind` with `params`.
    ///
    /// Null and empty-object parameters collapse to the bare kind.
    pub fn derive(kind: &TaskKind, params: &serde_json::Value) -> Self {
        if is_empty_params(params) {
            return Self(kind.as_str().to_string());
        }
        let mut canonical = String::new();
        write_canonical(params, &mut canonical);
        Self(format!("{kind}({canonical})"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for TaskKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Compact JSON with object keys sorted at every level.
fn write_canonical(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (k, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::Value::String(k.clone()).to_string());
                out.push(':');
                write_canonical(v, out);
            }
            out.push('}');
        }
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

fn is_empty_params(params: &serde_json::Value) -> bool {
    match params {
        serde_json::Value::Null => true,
        serde_json::Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Kind + parameters, the form in which tasks travel through the engine.
///
/// The key is computed once at construction and never changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawDescriptor", into = "RawDescriptor")]
pub struct TaskDescriptor {
    kind: TaskKind,
    params: serde_json::Value,
    key: TaskKey,
}

impl TaskDescriptor {
    pub fn new(kind: impl Into<String>, params: serde_json::Value) -> Self {
        let kind = TaskKind::new(kind);
        let key = TaskKey::derive(&kind, &params);
        Self { kind, params, key }
    }

    /// Descriptor for a kind that takes no parameters.
    pub fn bare(kind: impl Into<String>) -> Self {
        Self::new(kind, serde_json::Value::Null)
    }

    /// Parse `kind` or `kind:{json}` as typed on a command line.
    pub fn parse(input: &str) -> Result<Self, ConfigurationError> {
        let input = input.trim();
        let (kind, params) = match input.split_once(':') {
            Some((kind, raw)) => {
                let params = serde_json::from_str(raw).map_err(|e| {
                    ConfigurationError::MalformedDescriptor {
                        kind: TaskKind::new(kind.trim()),
                        reason: format!("params are not valid JSON: {e}"),
                    }
                })?;
                (kind.trim(), params)
            }
            None => (input, serde_json::Value::Null),
        };
        if kind.is_empty() {
            return Err(ConfigurationError::MalformedDescriptor {
                kind: TaskKind::new(kind),
                reason: "empty task kind".to_string(),
            });
        }
        Ok(Self::new(kind, params))
    }

    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    pub fn params(&self) -> &serde_json::Value {
        &self.params
    }

    pub fn key(&self) -> &TaskKey {
        &self.key
    }
}

#[derive(Serialize, Deserialize)]
struct RawDescriptor {
    kind: String,
    #[serde(default)]
    params: serde_json::Value,
}

impl From<RawDescriptor> for TaskDescriptor {
    fn from(raw: RawDescriptor) -> Self {
        Self::new(raw.kind, raw.params)
    }
}

impl From<TaskDescriptor> for RawDescriptor {
    fn from(desc: TaskDescriptor) -> Self {
        Self {
            kind: desc.kind.0,
            params: desc.params,
        }
    }
}
