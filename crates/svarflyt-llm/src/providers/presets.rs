use svarflyt_core::config::ModelConfig;
use svarflyt_core::error::{Result, SvarflytError};

/// Default endpoint and headers for an OpenAI-compatible provider.
pub struct ProviderPreset {
    /// Full chat-completions URL. `None` when the deployment decides it.
    pub default_base_url: Option<&'static str>,
    pub needs_api_key: bool,
    pub extra_headers: &'static [(&'static str, &'static str)],
}

/// Look up a provider preset by name.
pub fn get_preset(provider: &str) -> Option<ProviderPreset> {
    match provider {
        "openai" => Some(ProviderPreset {
            default_base_url: Some("https://api.openai.com/v1/chat/completions"),
            needs_api_key: true,
            extra_headers: &[],
        }),
        // Azure resource URLs are per deployment
        "azure" => Some(ProviderPreset {
            default_base_url: None,
            needs_api_key: true,
            extra_headers: &[],
        }),
        "ollama" => Some(ProviderPreset {
            default_base_url: Some("http://localhost:11434/v1/chat/completions"),
            needs_api_key: false,
            extra_headers: &[],
        }),
        "vllm" => Some(ProviderPreset {
            default_base_url: Some("http://localhost:8000/v1/chat/completions"),
            needs_api_key: false,
            extra_headers: &[],
        }),
        "groq" => Some(ProviderPreset {
            default_base_url: Some("https://api.groq.com/openai/v1/chat/completions"),
            needs_api_key: true,
            extra_headers: &[],
        }),
        "together" => Some(ProviderPreset {
            default_base_url: Some("https://api.together.xyz/v1/chat/completions"),
            needs_api_key: true,
            extra_headers: &[],
        }),
        "openrouter" => Some(ProviderPreset {
            default_base_url: Some("https://openrouter.ai/api/v1/chat/completions"),
            needs_api_key: true,
            extra_headers: &[("X-Title", "svarflyt")],
        }),
        _ => None,
    }
}

/// List all known preset provider names.
pub fn all_preset_names() -> &'static [&'static str] {
    &["openai", "azure", "ollama", "vllm", "groq", "together", "openrouter"]
}

/// Resolve the chat-completions URL: `model.base_url` wins over the preset.
pub fn resolve_endpoint(config: &ModelConfig) -> Result<String> {
    let preset = get_preset(&config.provider)
        .ok_or_else(|| SvarflytError::UnsupportedProvider(config.provider.clone()))?;

    match (&config.base_url, preset.default_base_url) {
        (Some(url), _) => Ok(url.clone()),
        (None, Some(url)) => Ok(url.to_string()),
        (None, None) => Err(SvarflytError::Config(format!(
            "provider '{}' requires model.base_url",
            config.provider
        ))),
    }
}
