//! Chat agent with tool execution

mod chat;
mod context;

pub use chat::{AgentOutcome, ChatAgent, Route, FALLBACK_ANSWER};
pub use context::ConversationContext;
