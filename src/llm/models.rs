//! Model-to-provider mapping and transport construction

use std::sync::Arc;

use crate::core::{Config, Result};
use crate::llm::anthropic::AnthropicTransport;
use crate::llm::openai::OpenAiTransport;
use crate::llm::traits::CompletionTransport;

/// Supported providers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
    OpenAi,
}

impl Provider {
    /// Infer the provider from a model identifier
    pub fn from_model_id(model: &str) -> Self {
        if model.contains("claude") {
            Provider::Anthropic
        } else {
            Provider::OpenAi
        }
    }
}

/// Create a transport for the given model
pub fn create_transport(config: &Config, model: &str) -> Result<Arc<dyn CompletionTransport>> {
    let transport: Arc<dyn CompletionTransport> = match Provider::from_model_id(model) {
        Provider::Anthropic => Arc::new(AnthropicTransport::from_config(config)?),
        Provider::OpenAi => Arc::new(OpenAiTransport::from_config(config)?),
    };
    Ok(transport)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_from_model_id() {
        assert_eq!(
            Provider::from_model_id("claude-3-5-sonnet-20241022"),
            Provider::Anthropic
        );
        assert_eq!(Provider::from_model_id("gpt-4o"), Provider::OpenAi);
        assert_eq!(Provider::from_model_id("o3-mini"), Provider::OpenAi);
    }
}
