//! Configuration management
//!
//! Supports environment variables, config files, and runtime overrides.
//!
//! Config file location: ~/.config/ensemble/config.toml

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

use crate::core::error::{EnsembleError, Result};

/// Engine-wide configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Provider endpoints and credentials
    #[serde(default)]
    pub providers: ProviderConfig,
    /// Run loop defaults
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// Provider endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Anthropic-compatible endpoint
    pub anthropic_base_url: String,
    /// OpenAI-compatible endpoint
    pub openai_base_url: String,
    /// Anthropic API key (falls back to ANTHROPIC_API_KEY)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anthropic_api_key: Option<String>,
    /// OpenAI API key (falls back to OPENAI_API_KEY)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            anthropic_base_url: env::var("ENSEMBLE_ANTHROPIC_URL")
                .unwrap_or_else(|_| "https://api.anthropic.com".to_string()),
            openai_base_url: env::var("ENSEMBLE_OPENAI_URL")
                .unwrap_or_else(|_| "https://api.openai.com".to_string()),
            anthropic_api_key: None,
            openai_api_key: None,
            timeout_secs: 120,
        }
    }
}

impl ProviderConfig {
    /// Resolve the Anthropic API key from config or environment
    pub fn anthropic_key(&self) -> Result<String> {
        self.anthropic_api_key
            .clone()
            .or_else(|| env::var("ANTHROPIC_API_KEY").ok())
            .ok_or_else(|| EnsembleError::config("ANTHROPIC_API_KEY is not set"))
    }

    /// Resolve the OpenAI API key from config or environment
    pub fn openai_key(&self) -> Result<String> {
        self.openai_api_key
            .clone()
            .or_else(|| env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| EnsembleError::config("OPENAI_API_KEY is not set"))
    }
}

/// Run loop defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Maximum turns per run
    /// Default: 6
    pub max_turns: usize,
    /// Maximum consecutive tool round-trips within one response
    /// Default: 8
    pub max_depth: usize,
    /// Per-invocation tool timeout in seconds
    /// Default: 30
    pub tool_timeout_secs: u64,
    /// Maximum conversation history length
    /// Default: 1000
    pub max_history: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_turns: env::var("ENSEMBLE_MAX_TURNS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(6),
            max_depth: env::var("ENSEMBLE_MAX_DEPTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8),
            tool_timeout_secs: env::var("ENSEMBLE_TOOL_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            max_history: 1000,
        }
    }
}

/// Identity and capability declaration for one agent
///
/// Immutable after the agent is constructed, except `tools`, which may be
/// appended to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Unique agent id
    pub id: String,
    /// Display name
    pub name: String,
    /// Persona prompt injected at the head of the conversation
    pub instruction: String,
    /// Description shown to peer agents
    #[serde(default)]
    pub description: String,
    /// Model identifier; selects the provider transport
    pub model: String,
    /// Capability names this agent may invoke
    #[serde(default)]
    pub tools: Vec<String>,
    /// Exactly one agent per manager may be primary
    #[serde(default)]
    pub is_primary: bool,
    /// Suppresses interactive prompts
    #[serde(default)]
    pub is_test: bool,
    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.8
}

fn default_max_tokens() -> u32 {
    1000
}

impl AgentConfig {
    pub fn new(id: impl Into<String>, model: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            instruction: String::new(),
            description: String::new(),
            model: model.into(),
            tools: Vec::new(),
            is_primary: false,
            is_test: false,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }

    pub fn instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn tools(mut self, tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self
    }

    pub fn test(mut self) -> Self {
        self.is_test = true;
        self
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ensemble")
    }

    /// Get the config file path
    pub fn config_file() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from file, environment, and defaults
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();

        if let Ok(config) = Self::load_from_file() {
            return config;
        }

        Self::default()
    }

    /// Load configuration from file only
    pub fn load_from_file() -> Result<Self> {
        let config_path = Self::config_file();

        if !config_path.exists() {
            return Err(EnsembleError::config("Config file not found"));
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|e| EnsembleError::config(format!("Failed to read config: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| EnsembleError::config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_dir = Self::config_dir();
        let config_path = Self::config_file();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .map_err(|e| EnsembleError::config(format!("Failed to create config dir: {}", e)))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| EnsembleError::config(format!("Failed to serialize config: {}", e)))?;

        fs::write(&config_path, content)
            .map_err(|e| EnsembleError::config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.runtime.max_turns, 6);
        assert_eq!(config.runtime.max_depth, 8);
        assert_eq!(config.runtime.tool_timeout_secs, 30);
        assert!(config
            .providers
            .anthropic_base_url
            .contains("api.anthropic.com"));
    }

    #[test]
    fn test_agent_config_builder() {
        let config = AgentConfig::new("main", "claude-3-5-sonnet")
            .instruction("You are the coordinator.")
            .tools(["edit", "shell"])
            .primary();

        assert_eq!(config.id, "main");
        assert!(config.is_primary);
        assert!(!config.is_test);
        assert_eq!(config.tools.len(), 2);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("max_turns"));
        assert!(toml_str.contains("anthropic_base_url"));
    }
}
