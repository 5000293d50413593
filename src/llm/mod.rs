//! Backend adapters and the provider abstraction
//!
//! Each supported backend gets one adapter module translating between the
//! canonical types in [`types`] and that backend's wire protocol. The rest
//! of the crate only sees [`LlmProvider`]; the concrete adapter is chosen
//! once, from configuration, by [`create_provider`].

mod anthropic;
mod error;
mod ollama;
mod openai;
mod types;

pub use anthropic::AnthropicProvider;
pub use error::LlmError;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use types::*;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Trait implemented by every backend adapter
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (stable identifier, e.g. "anthropic")
    fn name(&self) -> &str;

    /// Model the adapter will request
    fn model(&self) -> &str;

    /// Send one chat round-trip: full message list plus optional tool
    /// declarations, normalized response back.
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<LlmResponse, LlmError>;
}

/// Per-session backend selection
///
/// Supplied by the caller for each conversational session; the core treats
/// it as opaque input and resolves it exactly once, at construction.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BackendConfig {
    /// Provider identifier: "anthropic", "openai", or "ollama"
    pub provider: String,
    /// Model id; falls back to the provider's default when empty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Credential; local providers run without one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Endpoint override (Ollama host, proxy, test server)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl BackendConfig {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }
}

/// Resolve a credential from config, falling back to the environment.
fn resolve_api_key(
    explicit: Option<&str>,
    provider: &'static str,
    env_var: &'static str,
) -> Result<String, LlmError> {
    if let Some(key) = explicit {
        if !key.is_empty() {
            return Ok(key.to_string());
        }
    }
    match std::env::var(env_var) {
        Ok(key) if !key.is_empty() => Ok(key),
        _ => Err(LlmError::MissingApiKey { provider, env_var }),
    }
}

/// Create a backend adapter from per-session configuration
///
/// Dispatches on the provider identifier; this is the closed set of
/// supported backends. Configuration problems (unknown provider, missing
/// credential for a non-local backend) surface here as typed errors and
/// never later.
pub fn create_provider(config: &BackendConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let model = config.model.as_deref();
    match config.provider.to_lowercase().as_str() {
        "claude" | "anthropic" => {
            let key = resolve_api_key(config.api_key.as_deref(), "anthropic", "ANTHROPIC_API_KEY")?;
            let mut p = AnthropicProvider::new(key);
            if let Some(m) = model {
                p = p.with_model(m);
            }
            if let Some(u) = config.base_url.as_deref() {
                p = p.with_base_url(u);
            }
            Ok(Arc::new(p))
        }
        "openai" | "gpt" => {
            let key = resolve_api_key(config.api_key.as_deref(), "openai", "OPENAI_API_KEY")?;
            let mut p = OpenAiProvider::new(key);
            if let Some(m) = model {
                p = p.with_model(m);
            }
            if let Some(u) = config.base_url.as_deref() {
                p = p.with_base_url(u);
            }
            Ok(Arc::new(p))
        }
        "ollama" | "local" => {
            let mut p = OllamaProvider::new();
            if let Some(m) = model {
                p = p.with_model(m);
            }
            if let Some(u) = config.base_url.as_deref() {
                p = p.with_base_url(u);
            }
            Ok(Arc::new(p))
        }
        other => Err(LlmError::UnsupportedProvider(other.to_string())),
    }
}
