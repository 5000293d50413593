//! Review-improve orchestrator
//!
//! Drives reviewer passes and agent improvement re-runs after the initial
//! answer, bounded by `max_review_loops`. Two budgets nest here on
//! purpose: tool-calling convergence (agent iterations) and answer-quality
//! convergence (review loops) have different cost profiles and each needs
//! its own cap.
//!
//! Loop rules:
//! - loop 1 always gets an improvement pass, whatever the reviewer said;
//! - from loop 2 on, `continue_improving == false` stops with `APPROVED`;
//! - the loop that reaches `max_review_loops` stops unconditionally with
//!   `COMPLETED` and runs no further improvement.

use super::critique::ReviewOutcome;
use super::reviewer::ResponseReviewer;
use crate::agent::{AgentOutcome, ChatAgent, Route};
use crate::llm::{LlmProvider, Message, TokenUsage};
use crate::tools::{ToolCatalog, ToolExecution};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

const DEFAULT_MAX_REVIEW_LOOPS: u32 = 3;

/// Terminal state of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStatus {
    /// The reviewer signalled stop from loop 2 onward
    Approved,
    /// The loop cap (or the deadline) ended the cycle
    Completed,
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Approved => "APPROVED",
            PipelineStatus::Completed => "COMPLETED",
        }
    }
}

/// One reviewer pass, as recorded in metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewLoopRecord {
    pub loop_number: u32,
    pub score: u8,
    pub issue_count: usize,
    pub continue_improving: bool,
}

/// Aggregated review trail for one query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewSummary {
    pub loops_executed: u32,
    pub max_loops: u32,
    pub scores: Vec<u8>,
    pub status: PipelineStatus,
    pub history: Vec<ReviewLoopRecord>,
}

/// Observability payload returned beside the answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineMetadata {
    /// Correlates all log lines for this query
    pub request_id: String,
    /// Route of the last agent run
    pub route: Route,
    /// Agent iterations summed across all runs
    pub iterations: u32,
    /// Distinct tool names across all runs, first-use order
    pub tools_used: Vec<String>,
    /// Distinct names of tools that produced failed results
    pub tools_failed: Vec<String>,
    pub review: ReviewSummary,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub answer: String,
    pub metadata: PipelineMetadata,
}

pub struct ReviewPipeline {
    provider: Arc<dyn LlmProvider>,
    catalog: Arc<ToolCatalog>,
    max_review_loops: u32,
    max_iterations: Option<u32>,
    tool_timeout: Option<Duration>,
    deadline: Option<Instant>,
}

impl ReviewPipeline {
    pub fn new(provider: Arc<dyn LlmProvider>, catalog: Arc<ToolCatalog>) -> Self {
        Self {
            provider,
            catalog,
            max_review_loops: DEFAULT_MAX_REVIEW_LOOPS,
            max_iterations: None,
            tool_timeout: None,
            deadline: None,
        }
    }

    /// Review cycle cap; at least 1.
    pub fn with_max_review_loops(mut self, max_review_loops: u32) -> Self {
        self.max_review_loops = max_review_loops.max(1);
        self
    }

    /// Per-run agent iteration budget.
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = Some(timeout);
        self
    }

    /// Overall deadline, checked per agent iteration and per review cycle.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    fn agent(&self) -> ChatAgent {
        let mut agent = ChatAgent::new(Arc::clone(&self.provider), Arc::clone(&self.catalog));
        if let Some(max) = self.max_iterations {
            agent = agent.with_max_iterations(max);
        }
        if let Some(timeout) = self.tool_timeout {
            agent = agent.with_tool_timeout(timeout);
        }
        if let Some(deadline) = self.deadline {
            agent = agent.with_deadline(deadline);
        }
        agent
    }

    /// Answer a question with review-improve cycles. Infallible: every
    /// failure class is absorbed into the outcome.
    pub async fn process(&self, question: &str, history: &[Message]) -> PipelineOutcome {
        let request_id = Uuid::new_v4().to_string();
        tracing::info!(%request_id, max_review_loops = self.max_review_loops, "pipeline started");

        let agent = self.agent();
        let reviewer = ResponseReviewer::new(Arc::clone(&self.provider));

        let initial = agent.run(question, history).await;
        let mut aggregate = Aggregate::from_initial(&initial);
        let mut answer = initial.answer;

        let mut summary = ReviewSummary {
            loops_executed: 0,
            max_loops: self.max_review_loops,
            scores: Vec::new(),
            status: PipelineStatus::Completed,
            history: Vec::new(),
        };

        for loop_number in 1..=self.max_review_loops {
            if self.deadline_expired() {
                tracing::warn!(%request_id, loop_number, "deadline expired, delivering current answer");
                summary.status = PipelineStatus::Completed;
                break;
            }

            let (review, review_usage) = reviewer
                .review(
                    question,
                    history,
                    &answer,
                    &aggregate.executions,
                    loop_number,
                    self.max_review_loops,
                )
                .await;
            if let Some(usage) = review_usage {
                aggregate.usage.accumulate(&usage);
            }

            summary.loops_executed = loop_number;
            summary.scores.push(review.score);
            summary.history.push(ReviewLoopRecord {
                loop_number,
                score: review.score,
                issue_count: review.issues.len(),
                continue_improving: review.continue_improving,
            });
            tracing::info!(
                %request_id,
                loop_number,
                score = review.score,
                issues = review.issues.len(),
                continue_improving = review.continue_improving,
                "review pass recorded"
            );

            // Loop 1 is exempt from the stop signal: one improvement pass
            // is guaranteed.
            if loop_number >= 2 && !review.continue_improving {
                summary.status = PipelineStatus::Approved;
                break;
            }
            if loop_number == self.max_review_loops {
                summary.status = PipelineStatus::Completed;
                break;
            }

            let instruction = build_improvement_instruction(&review);
            let mut improvement_history = history.to_vec();
            improvement_history.push(Message::user(question.to_string()));
            improvement_history.push(Message::assistant(answer.clone()));

            let improved = agent.run(&instruction, &improvement_history).await;
            aggregate.merge(&improved);
            answer = improved.answer;
        }

        tracing::info!(
            %request_id,
            status = summary.status.as_str(),
            loops = summary.loops_executed,
            iterations = aggregate.iterations,
            "pipeline finished"
        );

        PipelineOutcome {
            answer,
            metadata: PipelineMetadata {
                request_id,
                route: aggregate.route,
                iterations: aggregate.iterations,
                tools_used: aggregate.tools_used,
                tools_failed: aggregate.tools_failed,
                review: summary,
                usage: aggregate.usage,
            },
        }
    }

    fn deadline_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Running union/sum of per-run agent statistics
struct Aggregate {
    route: Route,
    iterations: u32,
    tools_used: Vec<String>,
    tools_failed: Vec<String>,
    executions: Vec<ToolExecution>,
    usage: TokenUsage,
}

impl Aggregate {
    fn from_initial(outcome: &AgentOutcome) -> Self {
        let mut aggregate = Self {
            route: outcome.route,
            iterations: 0,
            tools_used: Vec::new(),
            tools_failed: Vec::new(),
            executions: Vec::new(),
            usage: TokenUsage::default(),
        };
        aggregate.merge(outcome);
        aggregate
    }

    fn merge(&mut self, outcome: &AgentOutcome) {
        self.route = outcome.route;
        self.iterations += outcome.iterations;
        for name in &outcome.tools_used {
            if !self.tools_used.contains(name) {
                self.tools_used.push(name.clone());
            }
        }
        for execution in &outcome.tool_history {
            if !execution.result.success && !self.tools_failed.contains(&execution.tool_name) {
                self.tools_failed.push(execution.tool_name.clone());
            }
        }
        self.executions.extend(outcome.tool_history.iter().cloned());
        self.usage.accumulate(&outcome.usage);
    }
}

/// Improvement instruction from the outstanding review findings.
fn build_improvement_instruction(review: &ReviewOutcome) -> String {
    let mut instruction =
        String::from("Improve your previous answer using this review feedback.\n");

    if !review.issues.is_empty() {
        instruction.push_str("\nIssues to fix:\n");
        for issue in &review.issues {
            instruction.push_str(&format!("- {}\n", issue));
        }
    }
    if !review.suggestions.is_empty() {
        instruction.push_str("\nSuggestions:\n");
        for suggestion in &review.suggestions {
            instruction.push_str(&format!("- {}\n", suggestion));
        }
    }
    if !review.tool_suggestions.is_empty() {
        instruction.push_str("\nTools worth using:\n");
        for tool in &review.tool_suggestions {
            instruction.push_str(&format!("- {}\n", tool));
        }
    }
    if !review.param_validation.is_empty() {
        instruction.push_str("\nTool calls to correct:\n");
        for param in &review.param_validation {
            instruction.push_str(&format!("- {}\n", param));
        }
    }

    instruction.push_str(&format!("\nReviewer assessment: {}\n", review.feedback));
    instruction.push_str("\nRespond with the improved answer only.");
    instruction
}
