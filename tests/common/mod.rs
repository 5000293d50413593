//! Shared scripted backend and tools for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use baton::llm::{
    LlmError, LlmProvider, LlmResponse, Message, TokenUsage, ToolCall, ToolDefinition,
};
use baton::tools::{Tool, ToolResult};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Backend whose replies are queued up front. Each `chat` call pops the
/// next reply; an exhausted script reports a malformed response, which a
/// test reads as "the code under test called the backend more often than
/// scripted".
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Result<LlmResponse, LlmError>>) -> Self {
        Self {
            script: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Number of chat calls made so far
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Messages sent on the nth chat call (0-based)
    pub fn request(&self, n: usize) -> Vec<Message> {
        self.requests.lock().unwrap()[n].clone()
    }

    pub fn text(text: &str) -> Result<LlmResponse, LlmError> {
        Ok(LlmResponse::Text {
            text: text.to_string(),
            usage: None,
        })
    }

    pub fn text_with_usage(text: &str, input: u32, output: u32) -> Result<LlmResponse, LlmError> {
        Ok(LlmResponse::Text {
            text: text.to_string(),
            usage: Some(TokenUsage::new(input, output)),
        })
    }

    /// A tool-call reply; each entry is (id, tool name, arguments).
    pub fn tool_calls(calls: &[(&str, &str, Value)]) -> Result<LlmResponse, LlmError> {
        Ok(LlmResponse::ToolCalls {
            calls: calls
                .iter()
                .map(|(id, name, arguments)| ToolCall {
                    id: id.to_string(),
                    name: name.to_string(),
                    arguments: arguments.clone(),
                })
                .collect(),
            usage: None,
        })
    }

    pub fn mixed(text: &str, calls: &[(&str, &str, Value)]) -> Result<LlmResponse, LlmError> {
        Ok(LlmResponse::Mixed {
            text: Some(text.to_string()),
            tool_calls: calls
                .iter()
                .map(|(id, name, arguments)| ToolCall {
                    id: id.to_string(),
                    name: name.to_string(),
                    arguments: arguments.clone(),
                })
                .collect(),
            usage: None,
        })
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-1"
    }

    async fn chat(
        &self,
        messages: &[Message],
        _tools: Option<&[ToolDefinition]>,
    ) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(messages.to_vec());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::MalformedResponse("script exhausted".to_string())))
    }
}

/// Tool with a fixed name and output
pub struct CannedTool {
    name: String,
    output: String,
}

impl CannedTool {
    pub fn new(name: &str, output: &str) -> Self {
        Self {
            name: name.to_string(),
            output: output.to_string(),
        }
    }
}

#[async_trait]
impl Tool for CannedTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Returns a canned payload"
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _params: Value) -> anyhow::Result<ToolResult> {
        Ok(ToolResult::success(self.output.clone()))
    }
}

/// Tool that reports its invocation arguments back as output
pub struct EchoTool {
    name: String,
}

impl EchoTool {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Echoes its arguments"
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, params: Value) -> anyhow::Result<ToolResult> {
        Ok(ToolResult::success(format!("echo: {}", params)))
    }
}

/// Tool whose execute always errors
pub struct FailingTool {
    name: String,
}

impl FailingTool {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _params: Value) -> anyhow::Result<ToolResult> {
        anyhow::bail!("database connection refused")
    }
}
