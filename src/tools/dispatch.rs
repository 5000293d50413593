//! Batch execution of model tool calls against the catalog
//!
//! One [`ToolExecution`] per input call, in input order. Failures of any
//! kind (unknown tool, executable error, panic, timeout) become failed
//! results; nothing escapes a dispatch as an error, so one bad call never
//! poisons its siblings.

use super::{ToolCatalog, ToolResult};
use crate::llm::ToolCall;
use futures::future::join_all;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// One dispatched call with its outcome, kept in the per-query history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecution {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: Value,
    pub result: ToolResult,
    pub duration_ms: u64,
}

pub struct ToolDispatcher {
    catalog: Arc<ToolCatalog>,
    call_timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(catalog: Arc<ToolCatalog>) -> Self {
        Self {
            catalog,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Run a batch of calls concurrently. `join_all` yields results in
    /// input order, so the call/result pairing survives arbitrary
    /// completion order.
    pub async fn dispatch(&self, calls: &[ToolCall]) -> Vec<ToolExecution> {
        join_all(calls.iter().map(|call| self.execute_one(call))).await
    }

    async fn execute_one(&self, call: &ToolCall) -> ToolExecution {
        let started = Instant::now();

        let result = match self.catalog.get(&call.name) {
            None => {
                tracing::warn!(tool = %call.name, call_id = %call.id, "unknown tool requested");
                ToolResult::error(format!("Unknown tool: {}", call.name))
            }
            Some(tool) => {
                let execution = AssertUnwindSafe(tool.execute(call.arguments.clone())).catch_unwind();
                match timeout(self.call_timeout, execution).await {
                    Ok(Ok(Ok(result))) => result,
                    Ok(Ok(Err(e))) => ToolResult::error(format!("Tool execution failed: {}", e)),
                    Ok(Err(panic)) => {
                        ToolResult::error(format!("Tool panicked: {}", panic_message(panic)))
                    }
                    Err(_) => ToolResult::error(format!(
                        "Tool execution timed out after {} seconds",
                        self.call_timeout.as_secs()
                    )),
                }
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::debug!(
            tool = %call.name,
            call_id = %call.id,
            success = result.success,
            attempts = result.attempt_count,
            duration_ms,
            "tool call dispatched"
        );

        ToolExecution {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            arguments: call.arguments.clone(),
            result,
            duration_ms,
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
