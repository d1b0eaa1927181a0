//! Base traits and types for tools callable by the upstream model.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::core::events::ToolCallRequest;
use crate::core::upstream::openai::ToolDef;

// =============================================================================
// Error Types
// =============================================================================

/// Errors a tool can return from [`Tool::invoke`].
#[derive(Debug, Error)]
pub enum ToolError {
    /// Arguments do not match the tool's schema
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// The backing HTTP API could not be reached
    #[error("Request failed: {0}")]
    Request(String),

    /// The backing API answered with an error status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The backing API answered with an unexpected body
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Tool is missing configuration (e.g. an API key)
    #[error("Tool not configured: {0}")]
    NotConfigured(String),
}

impl From<reqwest::Error> for ToolError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ToolError::InvalidResponse(e.to_string())
        } else {
            ToolError::Request(e.to_string())
        }
    }
}

/// Result type for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

// =============================================================================
// Tool definition
// =============================================================================

/// Name, description and JSON schema advertised to the upstream model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object
    pub parameters: Value,
}

impl From<&ToolDefinition> for ToolDef {
    fn from(def: &ToolDefinition) -> Self {
        ToolDef {
            tool_type: "function".to_string(),
            name: def.name.clone(),
            description: Some(def.description.clone()),
            parameters: Some(def.parameters.clone()),
        }
    }
}

// =============================================================================
// Tool trait
// =============================================================================

/// A tool the upstream model can call.
///
/// Implementations must be cheap to share: the dispatcher holds them as
/// `Arc<dyn Tool>` and invokes them concurrently from many sessions.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the arguments object.
    fn parameters(&self) -> Value;

    /// Run the tool. A JSON string result is sent upstream as-is; any other
    /// value is serialized.
    async fn invoke(&self, arguments: Value) -> ToolResult<Value>;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

// =============================================================================
// Invocations
// =============================================================================

/// Lifecycle of a tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Pending,
    Running,
    Completed,
    Failed,
    TimedOut,
}

impl ToolStatus {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            ToolStatus::Completed | ToolStatus::Failed | ToolStatus::TimedOut
        )
    }
}

/// One requested tool call as tracked by the dispatcher.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub call_id: String,
    pub name: String,
    /// Raw JSON arguments string
    pub arguments: String,
    pub status: ToolStatus,
    /// Set when the invocation starts running
    pub started_at: Option<Instant>,
}

impl ToolInvocation {
    pub fn new(
        call_id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            arguments: arguments.into(),
            status: ToolStatus::Pending,
            started_at: None,
        }
    }

    pub fn start(&mut self) {
        self.status = ToolStatus::Running;
        self.started_at = Some(Instant::now());
    }

    pub fn finish(&mut self, status: ToolStatus) {
        self.status = status;
    }

    /// Milliseconds since the invocation started running.
    pub fn elapsed_ms(&self) -> u128 {
        self.started_at
            .map(|t| t.elapsed().as_millis())
            .unwrap_or_default()
    }
}

impl From<ToolCallRequest> for ToolInvocation {
    fn from(request: ToolCallRequest) -> Self {
        Self::new(request.call_id, request.name, request.arguments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_definition_to_wire_tool() {
        let def = ToolDefinition {
            name: "tmdb_movie_search".to_string(),
            description: "Search movies".to_string(),
            parameters: json!({"type": "object"}),
        };
        let wire = ToolDef::from(&def);
        assert_eq!(wire.tool_type, "function");
        assert_eq!(wire.name, "tmdb_movie_search");
        assert_eq!(wire.parameters, Some(json!({"type": "object"})));
    }

    #[test]
    fn test_invocation_lifecycle() {
        let mut invocation = ToolInvocation::from(ToolCallRequest {
            call_id: "call_1".to_string(),
            name: "tmdb_tv_search".to_string(),
            arguments: "{}".to_string(),
        });
        assert_eq!(invocation.status, ToolStatus::Pending);
        assert!(invocation.started_at.is_none());

        invocation.start();
        assert_eq!(invocation.status, ToolStatus::Running);
        assert!(!invocation.status.is_finished());

        invocation.finish(ToolStatus::TimedOut);
        assert!(invocation.status.is_finished());
    }
}
