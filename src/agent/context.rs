//! Conversation context management
//!
//! Holds the ordered message list for one query and keeps it bounded:
//! oversized tool outputs are truncated before they enter the context, and
//! the oldest turns are evicted when the token estimate exceeds the limit.
//! Eviction removes whole turns, so a tool-call message never loses its
//! paired results.

use crate::llm::{ContentPart, Message, MessageContent, Role, ToolCall};

const DEFAULT_MAX_CONTEXT_TOKENS: usize = 100_000;

/// Max tokens for a single tool result, so one large page cannot fill the
/// context on its own
const MAX_TOOL_RESULT_TOKENS: usize = 8_000;

pub struct ConversationContext {
    messages: Vec<Message>,
    max_context_tokens: usize,
}

impl ConversationContext {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            max_context_tokens: DEFAULT_MAX_CONTEXT_TOKENS,
        }
    }

    pub fn with_max_context_tokens(mut self, max: usize) -> Self {
        self.max_context_tokens = max;
        self
    }

    pub fn add_system(&mut self, content: impl Into<String>) {
        self.messages.push(Message::system(content));
    }

    pub fn add_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    pub fn add_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
    }

    /// Prior conversation supplied by the caller, appended verbatim.
    pub fn add_history(&mut self, history: &[Message]) {
        self.messages.extend_from_slice(history);
    }

    /// One assistant message carrying every tool call of the turn. Must
    /// precede the matching tool results.
    pub fn add_assistant_tool_calls(&mut self, calls: &[ToolCall]) {
        self.messages.push(Message::assistant_tool_calls(calls));
    }

    /// Tool result, truncated if oversized, then context re-bounded.
    pub fn add_tool_result(&mut self, tool_call_id: impl Into<String>, output: &str) {
        let truncated = truncate_if_needed(output, MAX_TOOL_RESULT_TOKENS);
        self.messages
            .push(Message::tool_result(tool_call_id, truncated));
        self.trim_by_tokens();
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Rough token count, ~4 chars per token, rounded up.
    pub fn estimate_tokens(text: &str) -> usize {
        (text.len() + 3) / 4
    }

    pub fn estimate_total_tokens(&self) -> usize {
        self.messages
            .iter()
            .map(|m| match &m.content {
                MessageContent::Text(t) => Self::estimate_tokens(t),
                MessageContent::Parts(parts) => parts
                    .iter()
                    .map(|p| match p {
                        ContentPart::Text { text } => Self::estimate_tokens(text),
                        ContentPart::ToolUse { input, .. } => {
                            Self::estimate_tokens(&input.to_string())
                        }
                        ContentPart::ToolResult { content, .. } => Self::estimate_tokens(content),
                    })
                    .sum(),
            })
            .sum()
    }

    /// Evict oldest turns until the estimate fits. System messages always
    /// stay, and eviction stops before emptying the context entirely.
    fn trim_by_tokens(&mut self) {
        while self.estimate_total_tokens() > self.max_context_tokens {
            let non_system = self
                .messages
                .iter()
                .filter(|m| m.role != Role::System)
                .count();
            if non_system <= 1 || !self.evict_oldest_turn() {
                break;
            }
        }
    }

    /// Remove the oldest non-system turn. An assistant tool-call message
    /// owns the tool results that follow it, so they go together.
    fn evict_oldest_turn(&mut self) -> bool {
        let Some(start) = self.messages.iter().position(|m| m.role != Role::System) else {
            return false;
        };

        let mut end = start + 1;
        let is_tool_call_turn = self.messages[start].role == Role::Assistant
            && matches!(self.messages[start].content, MessageContent::Parts(_));
        if is_tool_call_turn {
            while end < self.messages.len() && self.messages[end].role == Role::Tool {
                end += 1;
            }
        }

        tracing::debug!(
            evicted = end - start,
            "evicted oldest turn to stay within context limit"
        );
        self.messages.drain(start..end);
        true
    }
}

impl Default for ConversationContext {
    fn default() -> Self {
        Self::new()
    }
}

fn truncate_if_needed(text: &str, max_tokens: usize) -> String {
    if ConversationContext::estimate_tokens(text) <= max_tokens {
        return text.to_string();
    }

    let max_chars = max_tokens * 4;
    let truncated: String = text.chars().take(max_chars).collect();
    format!(
        "{}\n\n... [truncated: tool output exceeded {} tokens]",
        truncated, max_tokens
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(ConversationContext::estimate_tokens(""), 0);
        assert_eq!(ConversationContext::estimate_tokens("abc"), 1);
        assert_eq!(ConversationContext::estimate_tokens("abcd"), 1);
        assert_eq!(ConversationContext::estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_messages_keep_insertion_order() {
        let mut ctx = ConversationContext::new();
        ctx.add_system("sys");
        ctx.add_user("question");
        ctx.add_assistant("answer");

        let roles: Vec<Role> = ctx.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
    }

    #[test]
    fn test_oversized_tool_result_is_truncated() {
        let mut ctx = ConversationContext::new();
        let huge = "x".repeat(MAX_TOOL_RESULT_TOKENS * 4 + 100);
        ctx.add_tool_result("call_1", &huge);

        let content = ctx.messages()[0].content.as_text().unwrap();
        assert!(content.len() < huge.len());
        assert!(content.contains("[truncated"));
    }

    #[test]
    fn test_small_tool_result_untouched() {
        let mut ctx = ConversationContext::new();
        ctx.add_tool_result("call_1", "small output");
        assert_eq!(
            ctx.messages()[0].content.as_text(),
            Some("small output")
        );
    }

    #[test]
    fn test_eviction_keeps_system_and_removes_whole_turns() {
        let mut ctx = ConversationContext::new().with_max_context_tokens(100);
        ctx.add_system("sys");
        ctx.add_user("first question with some padding text");

        let calls = vec![ToolCall {
            id: "call_echo_0".to_string(),
            name: "echo".to_string(),
            arguments: json!({"text": "padding padding padding"}),
        }];
        ctx.add_assistant_tool_calls(&calls);
        // Large enough to push the estimate over 100 tokens.
        ctx.add_tool_result("call_echo_0", &"y".repeat(800));

        // System survives; evicted turns never leave a dangling tool result.
        assert_eq!(ctx.messages()[0].role, Role::System);
        for window in ctx.messages().windows(2) {
            if window[1].role == Role::Tool {
                assert!(matches!(window[0].role, Role::Assistant | Role::Tool));
            }
        }
    }

    #[test]
    fn test_last_turn_never_evicted() {
        let mut ctx = ConversationContext::new().with_max_context_tokens(10);
        ctx.add_system("sys");
        ctx.add_tool_result("call_1", &"z".repeat(400));
        // Over budget but the only non-system message stays.
        assert_eq!(ctx.messages().len(), 2);
    }
}
