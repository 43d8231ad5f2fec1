//! Handler trait - Task を実行する Handler の定義
//!
//! - `Handler<T>`: what users implement, typed
//! - `DynHandler`: object-safe view the engine stores and calls
//! - `TypedHandler<T, H>`: erases `T`, decoding JSON params on the way in

use async_trait::async_trait;
use serde_json::Value;
use std::marker::PhantomData;

use super::task::Task;
use crate::domain::errors::{ConfigurationError, TaskError};
use crate::domain::outcome::Outcome;
use crate::domain::task::{TaskDescriptor, TaskKind};

/// 型 `T` の Task を実行する
///
/// # Example
/// ```ignore
/// struct FetchPageHandler;
///
/// #[async_trait]
/// impl Handler<FetchPage> for FetchPageHandler {
///     async fn handle(&self, task: FetchPage) -> Result<Outcome, TaskError> {
///         Ok(Outcome::done())
///     }
/// }
/// ```
///
/// # 冪等性
/// 実行は繰り返しても安全であること。作業が終わってから完了が記録される
/// までの間に実行が中断されることがある。
#[async_trait]
pub trait Handler<T: Task>: Send + Sync {
    async fn handle(&self, task: T) -> Result<Outcome, TaskError>;
}

/// How the engine decides a node of this kind is already complete.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionPolicy {
    /// A current completion record exists in the store.
    Recorded,

    /// Every listed child is complete. Nothing is ever stored for the node
    /// itself.
    Aggregate(Vec<TaskDescriptor>),
}

/// Object-safe handler, stored as `Arc<dyn DynHandler>` in the registry.
#[async_trait]
pub trait DynHandler: Send + Sync {
    fn kind(&self) -> &str;

    fn version(&self) -> &str;

    /// Static prerequisites of the node with these params.
    ///
    /// Params that do not decode into the task type are a configuration
    /// error, reported before anything runs.
    fn requires_dyn(&self, params: &Value) -> Result<Vec<TaskDescriptor>, ConfigurationError>;

    fn completion(&self, params: &Value) -> CompletionPolicy;

    async fn handle_dyn(&self, params: Value) -> Result<Outcome, TaskError>;
}

pub struct TypedHandler<T: Task, H: Handler<T>> {
    handler: H,
    _marker: PhantomData<T>,
}

impl<T: Task, H: Handler<T>> TypedHandler<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

/// Decode params into `T`.
///
/// `null` and `{}` both mean "no params", so each falls back to the other:
/// unit structs want `null`, braced empty structs want `{}`.
pub(crate) fn decode_params<T: Task>(params: &Value) -> Result<T, serde_json::Error> {
    match serde_json::from_value(params.clone()) {
        Ok(task) => Ok(task),
        Err(e) => {
            let alt = match params {
                Value::Null => Value::Object(Default::default()),
                Value::Object(map) if map.is_empty() => Value::Null,
                _ => return Err(e),
            };
            serde_json::from_value(alt).map_err(|_| e)
        }
    }
}

#[async_trait]
impl<T: Task, H: Handler<T>> DynHandler for TypedHandler<T, H> {
    fn kind(&self) -> &str {
        T::KIND
    }

    fn version(&self) -> &str {
        T::VERSION
    }

    fn requires_dyn(&self, params: &Value) -> Result<Vec<TaskDescriptor>, ConfigurationError> {
        let task: T =
            decode_params(params).map_err(|e| ConfigurationError::MalformedDescriptor {
                kind: TaskKind::new(T::KIND),
                reason: e.to_string(),
            })?;
        task.requires()
    }

    fn completion(&self, _params: &Value) -> CompletionPolicy {
        CompletionPolicy::Recorded
    }

    async fn handle_dyn(&self, params: Value) -> Result<Outcome, TaskError> {
        let task: T = decode_params(&params)
            .map_err(|e| TaskError::new(format!("json decode: {e}")))?;
        self.handler.handle(task).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize)]
    struct Double {
        value: i32,
    }

    impl Task for Double {
        const KIND: &'static str = "double";

        fn requires(&self) -> Result<Vec<TaskDescriptor>, ConfigurationError> {
            Ok(vec![TaskDescriptor::new("seed", json!({ "value": self.value }))])
        }
    }

    struct DoubleHandler;

    #[async_trait]
    impl Handler<Double> for DoubleHandler {
        async fn handle(&self, task: Double) -> Result<Outcome, TaskError> {
            if task.value < 0 {
                return Err(TaskError::new("negative"));
            }
            Ok(Outcome::done().yielding(TaskDescriptor::new(
                "double",
                json!({ "value": task.value * 2 }),
            )))
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Empty {}

    impl Task for Empty {
        const KIND: &'static str = "empty";
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Nothing;

    impl Task for Nothing {
        const KIND: &'static str = "nothing";
    }

    #[tokio::test]
    async fn typed_handler_decodes_and_runs() {
        let handler = TypedHandler::<Double, _>::new(DoubleHandler);
        assert_eq!(handler.kind(), "double");
        assert_eq!(handler.version(), "1");
        assert_eq!(handler.completion(&json!({})), CompletionPolicy::Recorded);

        let outcome = handler.handle_dyn(json!({ "value": 21 })).await.unwrap();
        assert_eq!(outcome.yielded[0].params()["value"], 42);

        let err = handler.handle_dyn(json!({ "value": -1 })).await.unwrap_err();
        assert_eq!(err.message(), "negative");
    }

    #[test]
    fn requires_dyn_rejects_malformed_params() {
        let handler = TypedHandler::<Double, _>::new(DoubleHandler);
        let err = handler.requires_dyn(&json!({ "value": "x" })).unwrap_err();
        assert!(matches!(err, ConfigurationError::MalformedDescriptor { .. }));

        let reqs = handler.requires_dyn(&json!({ "value": 5 })).unwrap();
        assert_eq!(reqs[0].key().as_str(), r#"seed({"value":5})"#);
    }

    #[test]
    fn empty_params_decode_either_way() {
        assert!(decode_params::<Empty>(&Value::Null).is_ok());
        assert!(decode_params::<Empty>(&json!({})).is_ok());
        assert!(decode_params::<Nothing>(&Value::Null).is_ok());
        assert!(decode_params::<Nothing>(&json!({})).is_ok());
        assert!(decode_params::<Nothing>(&json!({ "x": 1 })).is_err());
    }
}
