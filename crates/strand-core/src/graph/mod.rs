//! Graph - 実行中のタスクグラフと依存解決

pub mod dependency;
pub mod node;
pub mod resolver;
pub mod task_graph;

pub use self::dependency::DependencyGraph;
pub use self::node::TaskNode;
pub use self::resolver::Resolver;
pub use self::task_graph::TaskGraph;
