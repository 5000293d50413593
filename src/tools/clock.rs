//! Current-time tool for time-relative questions

use super::{Tool, ToolCategory, ToolResult};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

/// Reports the current UTC date and time.
pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time in UTC. Use when the question depends on \
         today's date or the time of day."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Pure
    }

    async fn execute(&self, _params: Value) -> Result<ToolResult> {
        let now = Utc::now();
        Ok(ToolResult::success(format!(
            "{} ({})",
            now.to_rfc3339(),
            now.format("%A, %d %B %Y, %H:%M UTC")
        )))
    }
}
