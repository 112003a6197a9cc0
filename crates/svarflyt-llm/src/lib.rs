pub mod chat;
pub mod providers;
pub mod streaming;
pub mod structured;

use tracing::warn;

use svarflyt_core::config::ModelConfig;
use svarflyt_core::error::{Result, SvarflytError};
use svarflyt_core::traits::LlmClient;

pub use chat::invoke;
pub use providers::openai::OpenAiClient;
pub use structured::{with_structured_output, StructuredOutput};

/// Create an LLM client based on the provider name.
pub fn create_client(config: &ModelConfig) -> Result<Box<dyn LlmClient>> {
    let preset = providers::presets::get_preset(&config.provider)
        .ok_or_else(|| SvarflytError::UnsupportedProvider(config.provider.clone()))?;
    let endpoint = providers::presets::resolve_endpoint(config)?;

    if preset.needs_api_key && config.api_key.is_none() {
        warn!(provider = %config.provider, "No model.api_key set for a provider that expects one");
    }

    Ok(Box::new(
        OpenAiClient::new(endpoint).with_headers(preset.extra_headers),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: &str) -> ModelConfig {
        ModelConfig {
            provider: provider.to_string(),
            model_id: "m".into(),
            api_key: None,
            base_url: None,
            max_tokens: 256,
            temperature: 0.0,
        }
    }

    #[test]
    fn test_openai_compatible_providers() {
        assert!(create_client(&config("openai")).is_ok());
        assert!(create_client(&config("ollama")).is_ok());
    }

    #[test]
    fn test_azure_without_base_url_rejected() {
        assert!(matches!(
            create_client(&config("azure")),
            Err(SvarflytError::Config(_))
        ));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        assert!(matches!(
            create_client(&config("carrier-pigeon")),
            Err(SvarflytError::UnsupportedProvider(_))
        ));
    }
}
