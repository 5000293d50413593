//! OpenAI backend adapter (chat-completion tool-calling protocol)
//!
//! Flat role/content messages; assistant tool calls ride in a
//! `tool_calls` array with JSON-string-encoded arguments, and results go
//! back as `role: "tool"` messages keyed by `tool_call_id`. Structurally
//! different from the Anthropic block protocol on purpose: the canonical
//! types in [`super::types`] are the meeting point.

use super::{
    ContentPart, LlmError, LlmProvider, LlmResponse, Message, MessageContent, Role, TokenUsage,
    ToolCall, ToolDefinition,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: usize,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 4096,
            base_url: OPENAI_API_URL.to_string(),
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    async fn send_request(&self, request: OpenAiRequest) -> Result<OpenAiResponse, LlmError> {
        let response = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
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
            .json::<OpenAiResponse>()
            .await
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<LlmResponse, LlmError> {
        let wire_messages = convert_messages(messages);

        let request = OpenAiRequest {
            model: self.model.clone(),
            messages: wire_messages,
            max_tokens: Some(self.max_tokens),
            tools: tools.filter(|t| !t.is_empty()).map(convert_tools),
            tool_choice: tools
                .filter(|t| !t.is_empty())
                .map(|_| "auto".to_string()),
        };

        tracing::debug!(
            model = %self.model,
            messages = request.messages.len(),
            tools = request.tools.as_ref().map(|t| t.len()).unwrap_or(0),
            "openai chat request"
        );

        let response = self.send_request(request).await?;
        parse_response(response)
    }
}

/// Map canonical messages onto the flat chat-completion shapes. Orphaned
/// tool linkage is dropped first: the API rejects a `tool` message whose
/// `tool_call_id` has no preceding assistant `tool_calls` entry, and an
/// assistant `tool_calls` entry with no answer.
fn convert_messages(messages: &[Message]) -> Vec<OpenAiChatMessage> {
    let wire: Vec<OpenAiChatMessage> = messages
        .iter()
        .map(|msg| {
            let role = match msg.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            };

            match &msg.content {
                MessageContent::Text(text) => OpenAiChatMessage {
                    role: role.to_string(),
                    content: Some(text.clone()),
                    tool_calls: None,
                    tool_call_id: msg.tool_call_id.clone(),
                },
                MessageContent::Parts(parts) => {
                    let tool_calls: Vec<OpenAiToolCall> = parts
                        .iter()
                        .filter_map(|p| {
                            if let ContentPart::ToolUse { id, name, input } = p {
                                Some(OpenAiToolCall {
                                    id: id.clone(),
                                    call_type: "function".to_string(),
                                    function: OpenAiFunctionCall {
                                        name: name.clone(),
                                        arguments: serde_json::to_string(input)
                                            .unwrap_or_default(),
                                    },
                                })
                            } else {
                                None
                            }
                        })
                        .collect();

                    if !tool_calls.is_empty() && msg.role == Role::Assistant {
                        OpenAiChatMessage {
                            role: role.to_string(),
                            content: None,
                            tool_calls: Some(tool_calls),
                            tool_call_id: None,
                        }
                    } else {
                        OpenAiChatMessage {
                            role: role.to_string(),
                            content: msg.content.as_text().map(str::to_string),
                            tool_calls: None,
                            tool_call_id: msg.tool_call_id.clone(),
                        }
                    }
                }
            }
        })
        .collect();

    drop_orphan_tool_messages(wire)
}

/// Two-pass filter keeping only complete call/result pairs.
fn drop_orphan_tool_messages(messages: Vec<OpenAiChatMessage>) -> Vec<OpenAiChatMessage> {
    let answered: HashSet<&str> = messages
        .iter()
        .filter(|m| m.role == "tool")
        .filter_map(|m| m.tool_call_id.as_deref())
        .collect();

    let complete_call_ids: HashSet<String> = messages
        .iter()
        .filter(|m| m.role == "assistant")
        .filter_map(|m| m.tool_calls.as_ref())
        .filter(|calls| calls.iter().all(|c| answered.contains(c.id.as_str())))
        .flat_map(|calls| calls.iter().map(|c| c.id.clone()))
        .collect();

    let before = messages.len();
    let kept: Vec<OpenAiChatMessage> = messages
        .into_iter()
        .filter(|m| match m.role.as_str() {
            "assistant" => match &m.tool_calls {
                Some(calls) => calls.iter().all(|c| complete_call_ids.contains(&c.id)),
                None => true,
            },
            "tool" => m
                .tool_call_id
                .as_deref()
                .is_some_and(|id| complete_call_ids.contains(id)),
            _ => true,
        })
        .collect();

    if kept.len() != before {
        tracing::warn!(
            dropped = before - kept.len(),
            "dropped orphaned tool-call messages before send"
        );
    }
    kept
}

fn convert_tools(tools: &[ToolDefinition]) -> Vec<OpenAiTool> {
    tools
        .iter()
        .map(|t| OpenAiTool {
            tool_type: "function".to_string(),
            function: OpenAiFunction {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.clone(),
            },
        })
        .collect()
}

/// Normalize a response body. Arguments arrive JSON-string-encoded and are
/// decoded here; a call missing its id gets a synthesized one.
fn parse_response(response: OpenAiResponse) -> Result<LlmResponse, LlmError> {
    let usage = response.usage.map(|u| TokenUsage {
        input_tokens: u.prompt_tokens,
        output_tokens: u.completion_tokens,
        total_tokens: u.total_tokens,
    });

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::MalformedResponse("response carried no choices".to_string()))?;

    let text = choice.message.content.filter(|c| !c.is_empty());
    let tool_calls: Vec<ToolCall> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(index, tc)| {
            let arguments =
                serde_json::from_str(&tc.function.arguments).unwrap_or(serde_json::Value::Null);
            let id = if tc.id.is_empty() {
                ToolCall::synthesize_id(&tc.function.name, index)
            } else {
                tc.id
            };
            ToolCall {
                id,
                name: tc.function.name,
                arguments,
            }
        })
        .collect();

    Ok(LlmResponse::from_parts(text, tool_calls, usage))
}

// Wire types

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAiChatMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAiToolCall {
    #[serde(default)]
    id: String,
    #[serde(rename = "type")]
    call_type: String,
    function: OpenAiFunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct OpenAiTool {
    #[serde(rename = "type")]
    tool_type: String,
    function: OpenAiFunction,
}

#[derive(Debug, Serialize)]
struct OpenAiFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChatMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_round_trip_preserves_role_and_content_order() {
        let messages = vec![
            Message::system("be brief"),
            Message::user("first"),
            Message::assistant("second"),
            Message::user("third"),
        ];
        let wire = convert_messages(&messages);

        let round_tripped: Vec<(&str, &str)> = wire
            .iter()
            .map(|m| (m.role.as_str(), m.content.as_deref().unwrap()))
            .collect();
        assert_eq!(
            round_tripped,
            vec![
                ("system", "be brief"),
                ("user", "first"),
                ("assistant", "second"),
                ("user", "third"),
            ]
        );
    }

    #[test]
    fn test_assistant_tool_calls_serialize_arguments_as_string() {
        let calls = vec![ToolCall {
            id: "call_abc".to_string(),
            name: "search".to_string(),
            arguments: json!({"query": "rust"}),
        }];
        let messages = vec![
            Message::assistant_tool_calls(&calls),
            Message::tool_result("call_abc", "3 hits"),
        ];
        let wire = convert_messages(&messages);
        assert_eq!(wire.len(), 2);

        let assistant = &wire[0];
        assert_eq!(assistant.role, "assistant");
        assert!(assistant.content.is_none());
        let tc = &assistant.tool_calls.as_ref().unwrap()[0];
        assert_eq!(tc.call_type, "function");
        assert_eq!(tc.function.name, "search");
        let decoded: serde_json::Value = serde_json::from_str(&tc.function.arguments).unwrap();
        assert_eq!(decoded["query"], "rust");

        let tool = &wire[1];
        assert_eq!(tool.role, "tool");
        assert_eq!(tool.tool_call_id.as_deref(), Some("call_abc"));
        assert_eq!(tool.content.as_deref(), Some("3 hits"));
    }

    #[test]
    fn test_orphaned_tool_result_is_dropped() {
        let messages = vec![
            Message::user("hi"),
            Message::tool_result("call_missing", "stale"),
        ];
        let wire = convert_messages(&messages);
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0].role, "user");
    }

    #[test]
    fn test_unanswered_assistant_calls_are_dropped() {
        let calls = vec![ToolCall {
            id: "call_unanswered".to_string(),
            name: "search".to_string(),
            arguments: json!({}),
        }];
        let messages = vec![
            Message::user("hi"),
            Message::assistant_tool_calls(&calls),
            Message::user("never mind"),
        ];
        let wire = convert_messages(&messages);
        let roles: Vec<&str> = wire.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["user", "user"]);
    }

    #[test]
    fn test_convert_tools_wraps_function() {
        let tools = vec![ToolDefinition {
            name: "fetch_page".to_string(),
            description: "Fetch a web page".to_string(),
            parameters: json!({"type": "object"}),
        }];
        let wire = convert_tools(&tools);
        assert_eq!(wire[0].tool_type, "function");
        assert_eq!(wire[0].function.name, "fetch_page");
    }

    #[test]
    fn test_parse_text_response() {
        let raw = json!({
            "choices": [{"message": {"role": "assistant", "content": "fine, thanks"}}],
            "usage": {"prompt_tokens": 7, "completion_tokens": 2, "total_tokens": 9}
        });
        let response: OpenAiResponse = serde_json::from_value(raw).unwrap();
        let parsed = parse_response(response).unwrap();
        assert_eq!(parsed.text(), Some("fine, thanks"));
        assert_eq!(parsed.usage().unwrap().total_tokens, 9);
    }

    #[test]
    fn test_parse_tool_call_response_decodes_arguments() {
        let raw = json!({
            "choices": [{"message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_xyz",
                    "type": "function",
                    "function": {"name": "find_by_budget", "arguments": "{\"max\": 500}"}
                }]
            }}]
        });
        let response: OpenAiResponse = serde_json::from_value(raw).unwrap();
        let parsed = parse_response(response).unwrap();
        assert!(matches!(parsed, LlmResponse::ToolCalls { .. }));
        let call = &parsed.tool_calls()[0];
        assert_eq!(call.id, "call_xyz");
        assert_eq!(call.arguments["max"], 500);
    }

    #[test]
    fn test_parse_synthesizes_missing_call_id() {
        let raw = json!({
            "choices": [{"message": {
                "role": "assistant",
                "tool_calls": [{
                    "type": "function",
                    "function": {"name": "search", "arguments": "{}"}
                }]
            }}]
        });
        let response: OpenAiResponse = serde_json::from_value(raw).unwrap();
        let parsed = parse_response(response).unwrap();
        assert_eq!(parsed.tool_calls()[0].id, "call_search_0");
    }

    #[test]
    fn test_parse_empty_choices_is_malformed() {
        let raw = json!({"choices": []});
        let response: OpenAiResponse = serde_json::from_value(raw).unwrap();
        let err = parse_response(response).unwrap_err();
        assert!(matches!(err, LlmError::MalformedResponse(_)));
    }

    #[test]
    fn test_parse_mixed_response() {
        let raw = json!({
            "choices": [{"message": {
                "role": "assistant",
                "content": "checking the catalog",
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "get_statistics", "arguments": "{}"}
                }]
            }}]
        });
        let response: OpenAiResponse = serde_json::from_value(raw).unwrap();
        let parsed = parse_response(response).unwrap();
        assert!(matches!(parsed, LlmResponse::Mixed { .. }));
        assert_eq!(parsed.text(), Some("checking the catalog"));
    }
}
