//! Configuration for baton
//!
//! Stores session defaults (provider, model, budgets) in `config.toml`
//! under the platform config directory. Conversation state is never
//! persisted here; the host owns that.

use crate::llm::BackendConfig;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub review: ReviewConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub default_provider: String,
    pub anthropic: AnthropicConfig,
    pub openai: OpenAiConfig,
    pub ollama: OllamaConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_provider: "claude".to_string(),
            anthropic: AnthropicConfig::default(),
            openai: OpenAiConfig::default(),
            ollama: OllamaConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnthropicConfig {
    pub model: String,
    pub max_tokens: usize,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 4096,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub model: String,
    pub max_tokens: usize,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            max_tokens: 4096,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.2".to_string(),
        }
    }
}

/// Budgets for a single agent run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub max_iterations: u32,
    pub tool_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            tool_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    pub enabled: bool,
    pub max_loops: u32,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_loops: 3,
        }
    }
}

impl Config {
    /// Load configuration from the default location or fall back to
    /// defaults, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from an explicit path; a missing file yields
    /// the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "baton") {
            let config_dir = proj_dirs.config_dir();
            std::fs::create_dir_all(config_dir)?;
            Ok(config_dir.join("config.toml"))
        } else {
            Ok(PathBuf::from("config.toml"))
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// `BATON_PROVIDER` and `BATON_MODEL` take precedence over the file
    /// for one session without rewriting it.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(provider) = std::env::var("BATON_PROVIDER") {
            if !provider.is_empty() {
                self.llm.default_provider = provider;
            }
        }
        if let Ok(model) = std::env::var("BATON_MODEL") {
            if !model.is_empty() {
                self.set_model(&self.llm.default_provider.clone(), model);
            }
        }
    }

    /// Resolve the backend selection for one session. CLI overrides beat
    /// the file; the api key is left to the provider's env lookup.
    pub fn backend_config(&self, provider: Option<&str>, model: Option<&str>) -> BackendConfig {
        let provider = provider
            .unwrap_or(&self.llm.default_provider)
            .to_ascii_lowercase();
        let model = model
            .map(str::to_string)
            .or_else(|| self.model_for(&provider));
        let base_url = matches!(provider.as_str(), "ollama" | "local")
            .then(|| self.llm.ollama.base_url.clone());

        BackendConfig {
            provider,
            model,
            api_key: None,
            base_url,
        }
    }

    fn model_for(&self, provider: &str) -> Option<String> {
        match provider {
            "claude" | "anthropic" => Some(self.llm.anthropic.model.clone()),
            "openai" | "gpt" => Some(self.llm.openai.model.clone()),
            "ollama" | "local" => Some(self.llm.ollama.model.clone()),
            _ => None,
        }
    }

    fn set_model(&mut self, provider: &str, model: String) {
        match provider {
            "claude" | "anthropic" => self.llm.anthropic.model = model,
            "openai" | "gpt" => self.llm.openai.model = model,
            "ollama" | "local" => self.llm.ollama.model = model,
            _ => {}
        }
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.agent.tool_timeout_secs)
    }
}
