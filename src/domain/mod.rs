//! Domain models for themekit
//!
//! Task names, task outcomes and the task graph, without any I/O concerns.

mod graph;
mod task;

pub use graph::{ExecutionReport, GraphError, TaskGraph};
pub use task::{TaskName, TaskOutcome, UnknownTask};
