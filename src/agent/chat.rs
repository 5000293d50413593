//! Chat agent: the bounded ask-model, run-tools, feed-back loop
//!
//! `ChatAgent::run` never fails. Backend errors become an explanatory
//! answer, tool failures are fed back to the model as failed results, and
//! an exhausted iteration or time budget falls back to a fixed apology.
//! The only errors that escape this crate are configuration errors raised
//! before a loop ever starts.

use super::ConversationContext;
use crate::llm::{LlmError, LlmProvider, LlmResponse, Message, TokenUsage, ToolDefinition};
use crate::tools::{ToolCatalog, ToolDispatcher, ToolExecution};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_MAX_ITERATIONS: u32 = 10;
const BACKEND_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Answer delivered when the loop runs out of budget before the model
/// produces one.
pub const FALLBACK_ANSWER: &str = "I'm sorry, I wasn't able to complete this request within \
     the allotted budget. Please try again with a narrower question.";

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Completed,
    MaxIterationsReached,
    DeadlineExceeded,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Completed => "completed",
            Route::MaxIterationsReached => "max_iterations_reached",
            Route::DeadlineExceeded => "deadline_exceeded",
        }
    }
}

/// Everything one `run` produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOutcome {
    pub answer: String,
    pub route: Route,
    /// Backend round-trips consumed
    pub iterations: u32,
    /// Distinct tool names, first-use order
    pub tools_used: Vec<String>,
    /// Every dispatched call in execution order
    pub tool_history: Vec<ToolExecution>,
    pub usage: TokenUsage,
}

pub struct ChatAgent {
    provider: Arc<dyn LlmProvider>,
    catalog: Arc<ToolCatalog>,
    dispatcher: ToolDispatcher,
    max_iterations: u32,
    deadline: Option<Instant>,
    system_prompt: Option<String>,
}

impl ChatAgent {
    pub fn new(provider: Arc<dyn LlmProvider>, catalog: Arc<ToolCatalog>) -> Self {
        Self {
            provider,
            dispatcher: ToolDispatcher::new(Arc::clone(&catalog)),
            catalog,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            deadline: None,
            system_prompt: None,
        }
    }

    /// Backend round-trip budget; at least 1.
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Replace the generated system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.dispatcher = ToolDispatcher::new(Arc::clone(&self.catalog)).with_call_timeout(timeout);
        self
    }

    /// Answer one question, iterating tool use until the model produces a
    /// final text or a budget runs out. Never returns an error; failures
    /// are absorbed into the outcome.
    pub async fn run(&self, question: &str, history: &[Message]) -> AgentOutcome {
        let mut context = ConversationContext::new();
        match &self.system_prompt {
            Some(prompt) => context.add_system(prompt.clone()),
            None => context.add_system(build_system_prompt(&self.catalog)),
        }
        context.add_history(history);
        context.add_user(question);

        let definitions = self.catalog.definitions();
        let tool_defs = (!definitions.is_empty()).then_some(definitions.as_slice());

        let mut tools_used: Vec<String> = Vec::new();
        let mut tool_history: Vec<ToolExecution> = Vec::new();
        let mut usage = TokenUsage::default();
        let mut iterations = 0u32;

        while iterations < self.max_iterations {
            if self.deadline_expired() {
                tracing::warn!(iterations, "deadline expired mid-run");
                return self.outcome(
                    FALLBACK_ANSWER.to_string(),
                    Route::DeadlineExceeded,
                    iterations,
                    tools_used,
                    tool_history,
                    usage,
                );
            }
            iterations += 1;

            let response = match self.call_backend(context.messages(), tool_defs).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(error = %e, iterations, "backend failure absorbed into answer");
                    return self.outcome(
                        explain_backend_failure(&e),
                        Route::Completed,
                        iterations,
                        tools_used,
                        tool_history,
                        usage,
                    );
                }
            };

            if let Some(u) = response.usage() {
                usage.accumulate(u);
            }

            let calls = match response {
                LlmResponse::Text { text, .. } => {
                    let answer = if text.trim().is_empty() {
                        tracing::warn!("model returned an empty answer");
                        FALLBACK_ANSWER.to_string()
                    } else {
                        text
                    };
                    return self.outcome(
                        answer,
                        Route::Completed,
                        iterations,
                        tools_used,
                        tool_history,
                        usage,
                    );
                }
                LlmResponse::ToolCalls { calls, .. } => calls,
                LlmResponse::Mixed {
                    text, tool_calls, ..
                } => {
                    // Tool calls win; the text is planning narration.
                    if let Some(text) = text {
                        tracing::debug!(chars = text.len(), "discarded narration beside tool calls");
                    }
                    tool_calls
                }
            };

            tracing::debug!(
                iteration = iterations,
                calls = calls.len(),
                "dispatching tool calls"
            );
            context.add_assistant_tool_calls(&calls);
            let executions = self.dispatcher.dispatch(&calls).await;
            for execution in &executions {
                if !tools_used.iter().any(|name| name == &execution.tool_name) {
                    tools_used.push(execution.tool_name.clone());
                }
                context.add_tool_result(&execution.call_id, &execution.result.output);
            }
            tool_history.extend(executions);
        }

        tracing::warn!(
            max_iterations = self.max_iterations,
            "iteration budget exhausted"
        );
        self.outcome(
            FALLBACK_ANSWER.to_string(),
            Route::MaxIterationsReached,
            iterations,
            tools_used,
            tool_history,
            usage,
        )
    }

    fn deadline_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// One bounded retry for retryable backend failures, then give up.
    async fn call_backend(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<LlmResponse, LlmError> {
        match self.provider.chat(messages, tools).await {
            Err(e) if e.is_retryable() => {
                tracing::warn!(error = %e, "retryable backend failure, retrying once");
                tokio::time::sleep(BACKEND_RETRY_DELAY).await;
                self.provider.chat(messages, tools).await
            }
            other => other,
        }
    }

    fn outcome(
        &self,
        answer: String,
        route: Route,
        iterations: u32,
        tools_used: Vec<String>,
        tool_history: Vec<ToolExecution>,
        usage: TokenUsage,
    ) -> AgentOutcome {
        tracing::info!(
            route = route.as_str(),
            iterations,
            tools = tools_used.len(),
            "agent run finished"
        );
        AgentOutcome {
            answer,
            route,
            iterations,
            tools_used,
            tool_history,
            usage,
        }
    }
}

/// System prompt from the catalog: capability list in registration order
/// plus the current time.
fn build_system_prompt(catalog: &ToolCatalog) -> String {
    let mut prompt =
        String::from("You are a helpful assistant that answers questions accurately.\n");
    if !catalog.is_empty() {
        prompt.push_str("\nYou can use these tools:\n");
        for tool in catalog.all() {
            prompt.push_str(&format!("- {}: {}\n", tool.name(), tool.description()));
        }
        prompt.push_str("\nCall a tool when it helps; otherwise answer directly.\n");
    }
    prompt.push_str(&format!("\nCurrent time: {}", Utc::now().to_rfc3339()));
    prompt
}

fn explain_backend_failure(error: &LlmError) -> String {
    format!(
        "I couldn't get a response from the language model backend: {}. \
         Please try again shortly.",
        error
    )
}
