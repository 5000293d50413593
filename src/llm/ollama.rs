//! Ollama backend adapter (local models)
//!
//! Talks to a local Ollama server over `/api/chat`. No API key. The
//! protocol differs from the hosted backends in two ways that matter
//! here: tool arguments travel as structured JSON (not string-encoded),
//! and tool calls carry no id, so this adapter synthesizes deterministic
//! ones with [`ToolCall::synthesize_id`].

use super::{
    ContentPart, LlmError, LlmProvider, LlmResponse, Message, MessageContent, Role, TokenUsage,
    ToolCall, ToolDefinition,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3.2";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaProvider {
    /// Defaults to localhost:11434; `OLLAMA_BASE_URL` and `OLLAMA_MODEL`
    /// override.
    pub fn new() -> Self {
        let base_url =
            env::var("OLLAMA_BASE_URL").unwrap_or_else(|_| DEFAULT_OLLAMA_URL.to_string());
        let model = env::var("OLLAMA_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url,
            model,
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    /// Probe the server. Used by the config check, not by `chat`.
    pub async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(2))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    async fn send_request(&self, request: OllamaRequest) -> Result<OllamaResponse, LlmError> {
        let url = format!("{}/api/chat", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(LlmError::from_network_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::from_http_status(status, error_text));
        }

        response
            .json::<OllamaResponse>()
            .await
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))
    }
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<LlmResponse, LlmError> {
        let request = OllamaRequest {
            model: self.model.clone(),
            messages: convert_messages(messages),
            stream: false,
            tools: tools.filter(|t| !t.is_empty()).map(convert_tools),
        };

        tracing::debug!(
            model = %self.model,
            messages = request.messages.len(),
            tools = request.tools.as_ref().map(|t| t.len()).unwrap_or(0),
            "ollama chat request"
        );

        let response = self.send_request(request).await?;
        Ok(parse_response(response))
    }
}

/// Flatten canonical messages onto Ollama's role/content shape. Assistant
/// tool-call turns are echoed back with their structured arguments; the
/// synthesized ids stay on our side because the protocol has no id field.
fn convert_messages(messages: &[Message]) -> Vec<OllamaMessage> {
    messages
        .iter()
        .map(|msg| {
            let role = match msg.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            };

            let tool_calls: Vec<OllamaToolCall> = match &msg.content {
                MessageContent::Parts(parts) if msg.role == Role::Assistant => parts
                    .iter()
                    .filter_map(|p| {
                        if let ContentPart::ToolUse { name, input, .. } = p {
                            Some(OllamaToolCall {
                                function: OllamaToolCallFunction {
                                    name: name.clone(),
                                    arguments: input.clone(),
                                },
                            })
                        } else {
                            None
                        }
                    })
                    .collect(),
                _ => Vec::new(),
            };

            OllamaMessage {
                role: role.to_string(),
                content: msg.content.as_text().unwrap_or("").to_string(),
                tool_calls: if tool_calls.is_empty() {
                    None
                } else {
                    Some(tool_calls)
                },
            }
        })
        .collect()
}

fn convert_tools(tools: &[ToolDefinition]) -> Vec<OllamaTool> {
    tools
        .iter()
        .map(|t| OllamaTool {
            tool_type: "function".to_string(),
            function: OllamaFunction {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.clone(),
            },
        })
        .collect()
}

fn parse_response(response: OllamaResponse) -> LlmResponse {
    let usage = match (response.prompt_eval_count, response.eval_count) {
        (None, None) => None,
        (input, output) => Some(TokenUsage::new(
            input.unwrap_or_default(),
            output.unwrap_or_default(),
        )),
    };

    let text = Some(response.message.content).filter(|c| !c.is_empty());
    let calls: Vec<ToolCall> = response
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(index, tc)| ToolCall {
            id: ToolCall::synthesize_id(&tc.function.name, index),
            name: tc.function.name,
            arguments: tc.function.arguments,
        })
        .collect();

    LlmResponse::from_parts(text, calls, usage)
}

// Wire types

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OllamaTool>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OllamaToolCall>>,
}

#[derive(Debug, Clone, Serialize)]
struct OllamaTool {
    #[serde(rename = "type")]
    tool_type: String,
    function: OllamaFunction,
}

#[derive(Debug, Clone, Serialize)]
struct OllamaFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaToolCall {
    function: OllamaToolCallFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaToolCallFunction {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_convert_flattens_roles_in_order() {
        let messages = vec![
            Message::system("short answers"),
            Message::user("what time is it"),
            Message::tool_result("call_current_time_0", "14:02"),
        ];
        let wire = convert_messages(&messages);
        let roles: Vec<&str> = wire.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "tool"]);
        assert_eq!(wire[2].content, "14:02");
    }

    #[test]
    fn test_assistant_echo_keeps_structured_arguments() {
        let calls = vec![ToolCall {
            id: "call_web_search_0".to_string(),
            name: "web_search".to_string(),
            arguments: json!({"query": "weather oslo", "limit": 3}),
        }];
        let wire = convert_messages(&[Message::assistant_tool_calls(&calls)]);
        let echoed = wire[0].tool_calls.as_ref().unwrap();
        assert_eq!(echoed[0].function.name, "web_search");
        assert_eq!(echoed[0].function.arguments["limit"], 3);
    }

    #[test]
    fn test_parse_synthesizes_positional_ids() {
        let raw = json!({
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [
                    {"function": {"name": "web_search", "arguments": {"query": "a"}}},
                    {"function": {"name": "web_search", "arguments": {"query": "b"}}},
                    {"function": {"name": "current_time", "arguments": {}}}
                ]
            }
        });
        let response: OllamaResponse = serde_json::from_value(raw).unwrap();
        let parsed = parse_response(response);
        let ids: Vec<&str> = parsed.tool_calls().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["call_web_search_0", "call_web_search_1", "call_current_time_2"]
        );
    }

    #[test]
    fn test_parse_text_with_eval_counts() {
        let raw = json!({
            "message": {"role": "assistant", "content": "hello there"},
            "prompt_eval_count": 12,
            "eval_count": 3
        });
        let response: OllamaResponse = serde_json::from_value(raw).unwrap();
        let parsed = parse_response(response);
        assert_eq!(parsed.text(), Some("hello there"));
        assert_eq!(parsed.usage().unwrap().total_tokens, 15);
    }

    #[test]
    fn test_parse_content_alongside_calls_is_mixed() {
        let raw = json!({
            "message": {
                "role": "assistant",
                "content": "let me check",
                "tool_calls": [{"function": {"name": "current_time", "arguments": {}}}]
            }
        });
        let response: OllamaResponse = serde_json::from_value(raw).unwrap();
        let parsed = parse_response(response);
        assert!(matches!(parsed, LlmResponse::Mixed { .. }));
    }

    #[test]
    fn test_convert_tools_wraps_function() {
        let tools = vec![ToolDefinition {
            name: "current_time".to_string(),
            description: "Current date and time".to_string(),
            parameters: json!({"type": "object", "properties": {}}),
        }];
        let wire = convert_tools(&tools);
        assert_eq!(wire[0].tool_type, "function");
        assert_eq!(wire[0].function.parameters["type"], "object");
    }
}
