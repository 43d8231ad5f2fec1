//! Task trait - 型付き Task の定義
//!
//! A `Task` value is its own parameters: serializing it gives the params
//! half of its descriptor, and the kind comes from `KIND`.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::domain::errors::ConfigurationError;
use crate::domain::task::{TaskDescriptor, TaskKind};

/// Binds a kind name to a parameter type.
///
/// # Example
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct FetchPage { page: u32 }
///
/// impl Task for FetchPage {
///     const KIND: &'static str = "fetch_page";
///
///     fn requires(&self) -> Result<Vec<TaskDescriptor>, ConfigurationError> {
///         Ok(vec![Login.descriptor()?])
///     }
/// }
/// ```
///
/// # Trait bounds
/// - `Serialize` / `DeserializeOwned`: params travel through the engine as JSON
/// - `Send + Sync + 'static`: handlers run on worker tasks
pub trait Task: Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: &'static str;

    /// Bump to invalidate every completion record of this kind.
    const VERSION: &'static str = "1";

    /// Static prerequisites.
    fn requires(&self) -> Result<Vec<TaskDescriptor>, ConfigurationError> {
        Ok(Vec::new())
    }

    /// Fails when the value does not serialize to JSON.
    fn descriptor(&self) -> Result<TaskDescriptor, ConfigurationError> {
        let params =
            serde_json::to_value(self).map_err(|e| ConfigurationError::MalformedDescriptor {
                kind: TaskKind::new(Self::KIND),
                reason: e.to_string(),
            })?;
        Ok(TaskDescriptor::new(Self::KIND, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize)]
    struct Unit;

    impl Task for Unit {
        const KIND: &'static str = "unit";
    }

    #[derive(Serialize, Deserialize)]
    struct Paged {
        page: u32,
    }

    impl Task for Paged {
        const KIND: &'static str = "paged";
        const VERSION: &'static str = "2";

        fn requires(&self) -> Result<Vec<TaskDescriptor>, ConfigurationError> {
            Ok(vec![Unit.descriptor()?])
        }
    }

    #[test]
    fn unit_task_descriptor_is_bare_kind() {
        assert_eq!(Unit.descriptor().unwrap().key().as_str(), "unit");
        assert_eq!(Unit::VERSION, "1");
    }

    #[test]
    fn params_come_from_the_value() {
        let d = Paged { page: 3 }.descriptor().unwrap();
        assert_eq!(d.key().as_str(), r#"paged({"page":3})"#);
        assert_eq!(Paged::VERSION, "2");

        let reqs = Paged { page: 3 }.requires().unwrap();
        assert_eq!(reqs[0].key().as_str(), "unit");
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("no params"))
        }
    }

    impl<'de> Deserialize<'de> for Unserializable {
        fn deserialize<D: serde::Deserializer<'de>>(_: D) -> Result<Self, D::Error> {
            Ok(Unserializable)
        }
    }

    impl Task for Unserializable {
        const KIND: &'static str = "unserializable";
    }

    #[test]
    fn serialize_failure_is_reported() {
        match Unserializable.descriptor() {
            Err(ConfigurationError::MalformedDescriptor { kind, reason }) => {
                assert_eq!(kind.as_str(), "unserializable");
                assert!(reason.contains("no params"));
            }
            other => panic!("expected malformed descriptor, got {other:?}"),
        }
    }
}
