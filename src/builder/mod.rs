//! Tool-driven build.
//!
//! This module plans tool calls, runs them through tool providers, records
//! every run in the logbook and orchestrates the build stages.

pub mod archiver;
pub mod call;
pub mod executor;
pub mod logbook;
pub mod pipeline;
pub mod plan;
pub mod provider;

pub use archiver::JarTool;
pub use call::{ToolCall, ToolRun};
pub use executor::{FailureMode, ToolError, ToolExecutor};
pub use logbook::Logbook;
pub use pipeline::{BuildPipeline, BuildReport};
pub use plan::CallPlanner;
pub use provider::{default_finder, ToolContext, ToolFinder, ToolProvider};
