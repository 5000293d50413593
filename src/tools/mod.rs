//! Tool trait, result envelope, and the catalog the agent draws from
//!
//! Tools are registered explicitly at startup. The catalog is immutable
//! after construction and shared as `Arc<ToolCatalog>`; iteration order is
//! registration order, which is also the order tools are advertised to the
//! model.

mod clock;
mod dispatch;
mod web;

pub use clock::CurrentTimeTool;
pub use dispatch::{ToolDispatcher, ToolExecution};
pub use web::{FetchPageTool, WebSearchTool};

use crate::llm::ToolDefinition;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Result of executing a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    /// Execution attempts made by the tool itself. Tools without internal
    /// retry report 1.
    pub attempt_count: u32,
    /// True when the tool retried up to its own limit and still failed.
    pub retries_exhausted: bool,
}

impl ToolResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            attempt_count: 1,
            retries_exhausted: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: message.into(),
            attempt_count: 1,
            retries_exhausted: false,
        }
    }

    /// Attach retry accounting. Used by tools that own a retry policy.
    pub fn with_attempts(mut self, attempt_count: u32, retries_exhausted: bool) -> Self {
        self.attempt_count = attempt_count;
        self.retries_exhausted = retries_exhausted;
        self
    }
}

/// Tool category, shown in the CLI listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolCategory {
    /// Local, no network access
    #[default]
    Pure,
    /// Talks to the network; may retry internally
    Network,
}

impl fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolCategory::Pure => write!(f, "pure"),
            ToolCategory::Network => write!(f, "network"),
        }
    }
}

/// A named capability the model may request
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name, echoed verbatim in model tool calls
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for the argument object
    fn parameters(&self) -> Value;

    /// Run with the argument map from the model
    async fn execute(&self, params: Value) -> Result<ToolResult>;

    fn category(&self) -> ToolCategory {
        ToolCategory::Pure
    }

    /// Canonical declaration sent to backends
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("duplicate tool name: {0}")]
    DuplicateTool(String),
}

/// Registry of available tools, ordered by registration
#[derive(Default)]
pub struct ToolCatalog {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the bundled tools: web search, page fetch, current time.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        catalog
            .register(Arc::new(WebSearchTool::new()))
            .expect("builtin tool names are unique");
        catalog
            .register(Arc::new(FetchPageTool::new()))
            .expect("builtin tool names are unique");
        catalog
            .register(Arc::new(CurrentTimeTool))
            .expect("builtin tool names are unique");
        catalog
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), CatalogError> {
        let name = tool.name().to_string();
        if self.index.contains_key(&name) {
            return Err(CatalogError::DuplicateTool(name));
        }
        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&i| Arc::clone(&self.tools[i]))
    }

    /// All tools in registration order
    pub fn all(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Declarations for the backend request, registration order
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.to_definition()).collect()
    }

    /// Restrict to the named tools, keeping this catalog's relative order.
    /// Unknown names are skipped with a warning.
    pub fn subset(&self, names: &[&str]) -> ToolCatalog {
        for name in names {
            if !self.index.contains_key(*name) {
                tracing::warn!(tool = %name, "subset requested unknown tool");
            }
        }

        let mut catalog = ToolCatalog::new();
        for tool in &self.tools {
            if names.contains(&tool.name()) {
                // Names are unique here by construction.
                let _ = catalog.register(Arc::clone(tool));
            }
        }
        catalog
    }
}
