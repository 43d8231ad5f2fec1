//! Typed - 型付き Task API
//!
//! # Two layers
//! - **Surface (typed)**: `Task`, `Handler<T>`, `Wrapper`
//! - **Inside (dyn)**: `DynHandler`, object-safe, what the engine stores

pub mod handler;
pub mod registry;
pub mod task;
pub mod wrapper;

pub use self::handler::{CompletionPolicy, DynHandler, Handler, TypedHandler};
pub use self::registry::{RegistryError, TypedRegistry};
pub use self::task::Task;
pub use self::wrapper::Wrapper;
