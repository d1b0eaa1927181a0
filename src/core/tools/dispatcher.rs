//! Tool dispatcher.
//!
//! Maps a tool call to a registered [`Tool`], runs it under a global
//! concurrency limit and a per-call timeout, and always produces a
//! [`ToolCallResult`]. Failures of any kind (unknown tool, bad arguments,
//! tool error, panic) become `Failed` results whose output starts with
//! `"Error: "`; exceeding the timeout becomes `TimedOut`.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::base::{Tool, ToolDefinition, ToolInvocation, ToolStatus};
use crate::core::error::BridgeError;
use crate::core::events::{ToolCallResult, ToolCallStatus};

/// Default number of tool invocations running at once across all sessions.
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 8;

/// Default per-call timeout.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(15);

/// Runs tool calls for every session of the process.
pub struct ToolDispatcher {
    tools: HashMap<String, Arc<dyn Tool>>,
    semaphore: Arc<Semaphore>,
    concurrency_limit: usize,
    timeout: Duration,
}

impl ToolDispatcher {
    /// Build the dispatcher. The tool table is fixed from here on; when two
    /// tools share a name the first one wins.
    pub fn new(tools: Vec<Arc<dyn Tool>>, concurrency_limit: usize, timeout: Duration) -> Self {
        let concurrency_limit = concurrency_limit.max(1);
        let mut table: HashMap<String, Arc<dyn Tool>> = HashMap::with_capacity(tools.len());

        for tool in tools {
            let name = tool.name().to_string();
            if table.contains_key(&name) {
                warn!(tool = %name, "Duplicate tool name, keeping the first registration");
                continue;
            }
            table.insert(name, tool);
        }

        info!(
            tools = table.len(),
            concurrency_limit,
            timeout_ms = timeout.as_millis() as u64,
            "Tool dispatcher ready"
        );

        Self {
            tools: table,
            semaphore: Arc::new(Semaphore::new(concurrency_limit)),
            concurrency_limit,
            timeout,
        }
    }

    /// A dispatcher without tools.
    pub fn empty() -> Self {
        Self::new(Vec::new(), DEFAULT_CONCURRENCY_LIMIT, DEFAULT_TOOL_TIMEOUT)
    }

    /// Definitions of all registered tools, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<ToolDefinition> =
            self.tools.values().map(|t| t.definition()).collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    /// Permits not currently held by running invocations.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run one invocation to completion.
    ///
    /// Waits for a concurrency permit first; the timeout only covers the
    /// time the tool actually runs.
    pub async fn dispatch(&self, mut invocation: ToolInvocation) -> ToolCallResult {
        let Some(tool) = self.tools.get(&invocation.name).cloned() else {
            warn!(call_id = %invocation.call_id, tool = %invocation.name, "Unknown tool requested");
            return failed(&mut invocation, "tool not found");
        };

        let arguments = match parse_arguments(&invocation.arguments) {
            Ok(arguments) => arguments,
            Err(message) => {
                return failed(&mut invocation, message);
            }
        };

        let _permit = match self.semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                return failed(&mut invocation, "dispatcher is shut down");
            }
        };

        invocation.start();
        debug!(call_id = %invocation.call_id, tool = %invocation.name, "Tool invocation started");

        let run = AssertUnwindSafe(tool.invoke(arguments)).catch_unwind();
        let outcome = tokio::time::timeout(self.timeout, run).await;

        match outcome {
            Ok(Ok(Ok(value))) => {
                invocation.finish(ToolStatus::Completed);
                info!(
                    call_id = %invocation.call_id,
                    tool = %invocation.name,
                    elapsed_ms = invocation.elapsed_ms() as u64,
                    "Tool invocation completed"
                );
                ToolCallResult {
                    call_id: invocation.call_id,
                    status: ToolCallStatus::Completed,
                    output: render_output(value),
                }
            }
            Ok(Ok(Err(e))) => failed(&mut invocation, e.to_string()),
            Ok(Err(panic)) => {
                let message = format!("panicked: {}", panic_message(panic.as_ref()));
                failed(&mut invocation, message)
            }
            Err(_) => {
                invocation.finish(ToolStatus::TimedOut);
                let err = BridgeError::ToolTimeout {
                    name: invocation.name.clone(),
                    timeout_ms: self.timeout.as_millis() as u64,
                };
                warn!(call_id = %invocation.call_id, error = %err, "Tool invocation timed out");
                ToolCallResult {
                    call_id: invocation.call_id,
                    status: ToolCallStatus::TimedOut,
                    output: format!("Error: {err}"),
                }
            }
        }
    }
}

fn failed(invocation: &mut ToolInvocation, message: impl Into<String>) -> ToolCallResult {
    invocation.finish(ToolStatus::Failed);
    let err = BridgeError::ToolFailure {
        name: invocation.name.clone(),
        message: message.into(),
    };
    warn!(call_id = %invocation.call_id, error = %err, "Tool invocation failed");
    ToolCallResult {
        call_id: invocation.call_id.clone(),
        status: ToolCallStatus::Failed,
        output: format!("Error: {err}"),
    }
}

/// Empty argument strings are treated as an empty object.
fn parse_arguments(raw: &str) -> Result<Value, String> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(raw).map_err(|e| format!("invalid arguments: {e}"))
}

fn render_output(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
