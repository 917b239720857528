use super::{
    anthropic::AnthropicProvider, base::Provider, configs::ProviderConfig, openai::OpenAiProvider,
};
use crate::errors::{ComputerUseError, ComputerUseResult};

/// Build the provider selected by configuration.
pub fn get_provider(config: ProviderConfig) -> ComputerUseResult<Box<dyn Provider>> {
    let provider: Box<dyn Provider> = match config {
        ProviderConfig::OpenAi(openai_config) => Box::new(OpenAiProvider::new(openai_config).map_err(startup)?),
        ProviderConfig::Anthropic(anthropic_config) => {
            Box::new(AnthropicProvider::new(anthropic_config).map_err(startup)?)
        }
    };
    Ok(provider)
}

fn startup(err: anyhow::Error) -> ComputerUseError {
    ComputerUseError::Config(format!("could not create HTTP client: {:#}", err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::configs::{AnthropicProviderConfig, OpenAiProviderConfig, DEFAULT_TIMEOUT};

    #[test]
    fn test_get_provider_selects_implementation() {
        let provider = get_provider(ProviderConfig::OpenAi(OpenAiProviderConfig {
            name: "groq".to_string(),
            host: "http://localhost:1".to_string(),
            api_key: Some("key".to_string()),
            model: "llama-3.3-70b-versatile".to_string(),
            temperature: None,
            max_tokens: None,
            timeout: DEFAULT_TIMEOUT,
        }))
        .unwrap();
        assert_eq!(provider.name(), "groq");
        assert_eq!(provider.model(), "llama-3.3-70b-versatile");

        let provider = get_provider(ProviderConfig::Anthropic(AnthropicProviderConfig {
            host: "http://localhost:1".to_string(),
            api_key: "key".to_string(),
            model: "claude-3-5-sonnet-20241022".to_string(),
            temperature: None,
            max_tokens: None,
            timeout: DEFAULT_TIMEOUT,
        }))
        .unwrap();
        assert_eq!(provider.name(), "anthropic");
    }
}
