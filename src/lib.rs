//! baton: an LLM tool-orchestration core
//!
//! This library provides:
//! - A canonical conversation model translated to multiple backend wire
//!   protocols (Anthropic, OpenAI, Ollama)
//! - A tool catalog with typed definitions and a concurrent dispatcher
//! - A bounded ask-model, run-tools, feed-back agent loop
//! - A review-improve cycle that critiques and refines answers before
//!   they are delivered

pub mod agent;
pub mod config;
pub mod llm;
pub mod review;
pub mod tools;

pub use agent::{AgentOutcome, ChatAgent, Route};
pub use config::Config;
pub use llm::{create_provider, BackendConfig, LlmError, LlmProvider};
pub use review::{PipelineOutcome, ReviewPipeline};
pub use tools::{Tool, ToolCatalog, ToolResult};
