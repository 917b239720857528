use std::time::Duration;

use strum_macros::{Display, EnumIter, EnumString};

use crate::config::get_env;
use crate::errors::{ComputerUseError, ComputerUseResult};

/// Backends selectable by name at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ProviderKind {
    OpenAi,
    OpenRouter,
    Groq,
    Fireworks,
    Ollama,
    Anthropic,
}

/// Static defaults for a provider kind.
#[derive(Debug, Clone, Copy)]
pub struct Preset {
    pub host: &'static str,
    pub host_env: &'static str,
    /// None when the backend does not take a key
    pub api_key_env: Option<&'static str>,
    pub default_model: &'static str,
    /// Friendly names mapped to backend model ids
    pub aliases: &'static [(&'static str, &'static str)],
}

impl ProviderKind {
    pub fn preset(&self) -> Preset {
        match self {
            ProviderKind::OpenAi => Preset {
                host: "https://api.openai.com",
                host_env: "OPENAI_HOST",
                api_key_env: Some("OPENAI_API_KEY"),
                default_model: "gpt-4o",
                aliases: &[("gpt4", "gpt-4"), ("gpt4o", "gpt-4o")],
            },
            ProviderKind::OpenRouter => Preset {
                host: "https://openrouter.ai/api",
                host_env: "OPENROUTER_HOST",
                api_key_env: Some("OPENROUTER_API_KEY"),
                default_model: "qwen-2.5-vl",
                aliases: &[
                    ("qwen-2.5-vl", "qwen/qwen2.5-vl-72b-instruct"),
                    ("llama3.2", "meta-llama/llama-3.2-90b-vision-instruct"),
                    ("llama3.3", "meta-llama/llama-3.3-70b-instruct"),
                ],
            },
            ProviderKind::Groq => Preset {
                host: "https://api.groq.com/openai",
                host_env: "GROQ_HOST",
                api_key_env: Some("GROQ_API_KEY"),
                default_model: "llama3.3",
                aliases: &[
                    ("llama3.2", "llama-3.2-90b-vision-preview"),
                    ("llama3.3", "llama-3.3-70b-versatile"),
                ],
            },
            ProviderKind::Fireworks => Preset {
                host: "https://api.fireworks.ai/inference",
                host_env: "FIREWORKS_HOST",
                api_key_env: Some("FIREWORKS_API_KEY"),
                default_model: "llama3.3",
                aliases: &[
                    ("llama3.2", "accounts/fireworks/models/llama-v3p2-90b-vision-instruct"),
                    ("llama3.3", "accounts/fireworks/models/llama-v3p3-70b-instruct"),
                ],
            },
            ProviderKind::Ollama => Preset {
                host: "http://localhost:11434",
                host_env: "OLLAMA_HOST",
                api_key_env: None,
                default_model: "qwen2.5",
                aliases: &[],
            },
            ProviderKind::Anthropic => Preset {
                host: "https://api.anthropic.com",
                host_env: "ANTHROPIC_HOST",
                api_key_env: Some("ANTHROPIC_API_KEY"),
                default_model: "claude-3.5-sonnet",
                aliases: &[("claude-3.5-sonnet", "claude-3-5-sonnet-20241022")],
            },
        }
    }
}

impl Preset {
    /// Map a friendly model name onto the backend id, passing unknown names through.
    pub fn resolve_model(&self, model: &str) -> String {
        self.aliases
            .iter()
            .find(|(alias, _)| *alias == model)
            .map(|(_, id)| id.to_string())
            .unwrap_or_else(|| model.to_string())
    }
}

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_MAX_TOKENS: i32 = 4096;

/// Settings for any OpenAI-compatible chat completions endpoint
#[derive(Debug, Clone)]
pub struct OpenAiProviderConfig {
    /// Name reported in logs and errors, e.g. `groq`
    pub name: String,
    pub host: String,
    pub api_key: Option<String>,
    /// Backend model id, already resolved from any alias
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AnthropicProviderConfig {
    pub host: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
    pub timeout: Duration,
}

/// Unified enum to wrap different provider configurations
#[derive(Debug, Clone)]
pub enum ProviderConfig {
    OpenAi(OpenAiProviderConfig),
    Anthropic(AnthropicProviderConfig),
}

impl ProviderConfig {
    /// Load configuration for `kind` from the environment.
    ///
    /// `model` may be a friendly alias; when absent `COMPUTER_USE_MODEL` and then
    /// the preset default are used.
    pub fn from_env(kind: ProviderKind, model: Option<String>, timeout: Duration) -> ComputerUseResult<Self> {
        let preset = kind.preset();

        let host = get_env(preset.host_env, false, Some(preset.host.to_string()))?
            .unwrap_or_else(|| preset.host.to_string());
        let api_key = match preset.api_key_env {
            Some(key) => get_env(key, true, None)?,
            None => None,
        };
        let requested = match model {
            Some(model) => model,
            None => get_env("COMPUTER_USE_MODEL", false, Some(preset.default_model.to_string()))?
                .unwrap_or_else(|| preset.default_model.to_string()),
        };
        let model = preset.resolve_model(&requested);
        let temperature = parse_optional::<f32>("COMPUTER_USE_TEMPERATURE")?;
        let max_tokens = parse_optional::<i32>("COMPUTER_USE_MAX_TOKENS")?;

        let config = match kind {
            ProviderKind::Anthropic => ProviderConfig::Anthropic(AnthropicProviderConfig {
                host,
                api_key: api_key.ok_or_else(|| {
                    ComputerUseError::Config("Anthropic API key should be present".to_string())
                })?,
                model,
                temperature,
                max_tokens,
                timeout,
            }),
            _ => ProviderConfig::OpenAi(OpenAiProviderConfig {
                name: kind.to_string(),
                host,
                api_key,
                model,
                temperature,
                max_tokens,
                timeout,
            }),
        };
        Ok(config)
    }
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> ComputerUseResult<Option<T>> {
    match get_env(key, false, None)? {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ComputerUseError::Config(format!("Invalid value for {}: {}", key, raw))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_kind_names_round_trip() {
        for kind in ProviderKind::iter() {
            assert_eq!(ProviderKind::from_str(&kind.to_string()).unwrap(), kind);
        }
        assert_eq!(ProviderKind::from_str("OpenAI").unwrap(), ProviderKind::OpenAi);
        assert_eq!(ProviderKind::OpenRouter.to_string(), "openrouter");
        assert!(ProviderKind::from_str("mystery").is_err());
    }

    #[test]
    fn test_alias_resolution() {
        let groq = ProviderKind::Groq.preset();
        assert_eq!(groq.resolve_model("llama3.3"), "llama-3.3-70b-versatile");
        assert_eq!(groq.resolve_model("mixtral-8x7b"), "mixtral-8x7b");

        let anthropic = ProviderKind::Anthropic.preset();
        assert_eq!(
            anthropic.resolve_model(anthropic.default_model),
            "claude-3-5-sonnet-20241022"
        );
    }

    #[test]
    fn test_ollama_from_env_needs_no_key() {
        let config = ProviderConfig::from_env(
            ProviderKind::Ollama,
            Some("llava".to_string()),
            DEFAULT_TIMEOUT,
        )
        .unwrap();
        match config {
            ProviderConfig::OpenAi(config) => {
                assert_eq!(config.name, "ollama");
                assert!(config.api_key.is_none());
                assert_eq!(config.model, "llava");
            }
            other => panic!("unexpected config {:?}", other),
        }
    }
}
