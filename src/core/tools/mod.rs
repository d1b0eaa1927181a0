//! Tools the upstream model can call, and the dispatcher that runs them.

pub mod base;
pub mod dispatcher;
pub mod tmdb;
pub mod video_search;

pub use base::{Tool, ToolDefinition, ToolError, ToolInvocation, ToolResult, ToolStatus};
pub use dispatcher::{DEFAULT_CONCURRENCY_LIMIT, DEFAULT_TOOL_TIMEOUT, ToolDispatcher};
pub use video_search::VideoSearchTool;
