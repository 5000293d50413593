//! Second-pass reviewer: critiques a draft answer
//!
//! One non-tool completion per pass. The reviewer never blocks delivery:
//! backend failures and malformed replies collapse to the safe defaults in
//! [`super::critique`].

use super::critique::{parse_critique, ReviewOutcome};
use crate::llm::{LlmProvider, Message, Role, TokenUsage};
use crate::tools::ToolExecution;
use std::sync::Arc;

/// Turns of prior conversation included in the critique prompt
const HISTORY_WINDOW: usize = 5;

/// Max characters of tool arguments shown per executed call
const ARGS_PREVIEW_CHARS: usize = 120;

const REVIEWER_SYSTEM_PROMPT: &str = "You are a meticulous reviewer. You critique draft \
     answers for accuracy, completeness, and proper use of the available tools. You reply \
     only in the requested format.";

pub struct ResponseReviewer {
    provider: Arc<dyn LlmProvider>,
}

impl ResponseReviewer {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    /// Review a draft, reporting the tokens the pass consumed. Infallible:
    /// a reviewer malfunction yields the safe default outcome instead of
    /// an error.
    pub async fn review(
        &self,
        question: &str,
        history: &[Message],
        draft: &str,
        executions: &[ToolExecution],
        loop_number: u32,
        max_loops: u32,
    ) -> (ReviewOutcome, Option<TokenUsage>) {
        let prompt = build_critique_prompt(question, history, draft, executions, loop_number, max_loops);
        let messages = [
            Message::system(REVIEWER_SYSTEM_PROMPT),
            Message::user(prompt),
        ];

        match self.provider.chat(&messages, None).await {
            Ok(response) => {
                let usage = response.usage().cloned();
                let outcome = match response.text() {
                    Some(text) => parse_critique(text),
                    None => {
                        tracing::warn!("reviewer replied with tool calls instead of a critique");
                        ReviewOutcome::fallback(
                            "The reviewer did not produce a readable critique for this pass.",
                        )
                    }
                };
                (outcome, usage)
            }
            Err(e) => {
                tracing::warn!(error = %e, loop_number, "review pass skipped after backend failure");
                let outcome = ReviewOutcome::fallback(format!(
                    "Review pass skipped: the backend was unavailable ({})",
                    e
                ));
                (outcome, None)
            }
        }
    }
}

/// Assemble the critique prompt: question, recent history window, executed
/// tool summary, the draft, and the reply format.
fn build_critique_prompt(
    question: &str,
    history: &[Message],
    draft: &str,
    executions: &[ToolExecution],
    loop_number: u32,
    max_loops: u32,
) -> String {
    let mut prompt = format!(
        "Review the draft answer below. This is review pass {} of {}.\n\nQuestion:\n{}\n",
        loop_number, max_loops, question
    );

    let window_start = history.len().saturating_sub(HISTORY_WINDOW);
    if window_start < history.len() {
        prompt.push_str("\nRecent conversation:\n");
        for msg in &history[window_start..] {
            let role = match msg.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            };
            let text = msg.content.as_text().unwrap_or("[tool interaction]");
            prompt.push_str(&format!("{}: {}\n", role, text));
        }
    }

    if !executions.is_empty() {
        prompt.push_str("\nTools executed for this answer:\n");
        for execution in executions {
            prompt.push_str(&format!(
                "- {}({}) -> {}\n",
                execution.tool_name,
                preview_args(&execution.arguments),
                if execution.result.success { "ok" } else { "failed" }
            ));
        }
    }

    prompt.push_str(&format!("\nDraft answer:\n{}\n", draft));
    prompt.push_str(
        "\nReply in exactly this format:\n\
         SCORE: <0-100>\n\
         ISSUES:\n\
         - <each factual or structural problem>\n\
         SUGGESTIONS:\n\
         - <each concrete improvement>\n\
         TOOLS:\n\
         - <each tool that should have been used>\n\
         PARAMETERS:\n\
         - <each tool call made with wrong or missing arguments>\n\
         FEEDBACK: <one-paragraph overall assessment>\n\
         CONTINUE: <yes if another improvement pass is worthwhile, otherwise no>\n",
    );
    prompt
}

fn preview_args(arguments: &serde_json::Value) -> String {
    let rendered = arguments.to_string();
    if rendered.chars().count() <= ARGS_PREVIEW_CHARS {
        return rendered;
    }
    let cut: String = rendered.chars().take(ARGS_PREVIEW_CHARS).collect();
    format!("{}...", cut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, LlmResponse, ToolDefinition};
    use crate::tools::ToolResult;
    use async_trait::async_trait;
    use serde_json::json;

    struct FixedProvider(Result<&'static str, LlmError>);

    #[async_trait]
    impl LlmProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        fn model(&self) -> &str {
            "fixed-1"
        }

        async fn chat(
            &self,
            _messages: &[Message],
            _tools: Option<&[ToolDefinition]>,
        ) -> Result<LlmResponse, LlmError> {
            match &self.0 {
                Ok(text) => Ok(LlmResponse::Text {
                    text: text.to_string(),
                    usage: None,
                }),
                Err(e) => Err(LlmError::ServiceError(e.to_string())),
            }
        }
    }

    fn execution(name: &str, arguments: serde_json::Value, success: bool) -> ToolExecution {
        ToolExecution {
            call_id: format!("call_{}_0", name),
            tool_name: name.to_string(),
            arguments,
            result: if success {
                ToolResult::success("data")
            } else {
                ToolResult::error("no data")
            },
            duration_ms: 3,
        }
    }

    #[test]
    fn test_prompt_windows_history_to_last_five_turns() {
        let history: Vec<Message> = (0..7).map(|i| Message::user(format!("turn {}", i))).collect();
        let prompt = build_critique_prompt("q", &history, "draft", &[], 1, 3);

        assert!(!prompt.contains("turn 0"));
        assert!(!prompt.contains("turn 1"));
        assert!(prompt.contains("turn 2"));
        assert!(prompt.contains("turn 6"));
    }

    #[test]
    fn test_prompt_summarizes_executions() {
        let executions = vec![
            execution("web_search", json!({"query": "rust"}), true),
            execution("fetch_page", json!({"url": "https://example.com"}), false),
        ];
        let prompt = build_critique_prompt("q", &[], "draft", &executions, 2, 3);

        assert!(prompt.contains("web_search({\"query\":\"rust\"}) -> ok"));
        assert!(prompt.contains("fetch_page") && prompt.contains("-> failed"));
        assert!(prompt.contains("review pass 2 of 3"));
    }

    #[test]
    fn test_prompt_truncates_long_arguments() {
        let long = "x".repeat(500);
        let executions = vec![execution("web_search", json!({ "query": long }), true)];
        let prompt = build_critique_prompt("q", &[], "draft", &executions, 1, 3);

        let line = prompt
            .lines()
            .find(|l| l.starts_with("- web_search"))
            .unwrap();
        assert!(line.len() < 200);
        assert!(line.contains("..."));
    }

    #[tokio::test]
    async fn test_review_parses_provider_reply() {
        let reviewer = ResponseReviewer::new(Arc::new(FixedProvider(Ok(
            "SCORE: 40\nISSUES:\n- wrong century\nFEEDBACK: fix the dates\nCONTINUE: yes",
        ))));
        let (outcome, usage) = reviewer.review("q", &[], "draft", &[], 1, 3).await;

        assert_eq!(outcome.score, 40);
        assert_eq!(outcome.issues, vec!["wrong century"]);
        assert!(outcome.continue_improving);
        assert!(usage.is_none());
    }

    #[tokio::test]
    async fn test_backend_failure_yields_safe_defaults() {
        let reviewer = ResponseReviewer::new(Arc::new(FixedProvider(Err(
            LlmError::ServiceError("overloaded".to_string()),
        ))));
        let (outcome, _) = reviewer.review("q", &[], "draft", &[], 1, 3).await;

        assert_eq!(outcome.score, 100);
        assert!(!outcome.continue_improving);
        assert!(outcome.feedback.contains("unavailable"));
    }
}
