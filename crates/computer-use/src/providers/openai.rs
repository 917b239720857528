use anyhow::{anyhow, Result};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde_json::{json, Value};

use super::base::{Completion, Provider, Usage};
use super::configs::OpenAiProviderConfig;
use super::utils::{
    check_openai_context_length_error, messages_to_openai_spec, openai_response_to_completion,
    tools_to_openai_spec, validate_messages,
};
use crate::errors::{from_transport, ComputerUseError, ComputerUseResult};
use crate::models::message::Message;
use crate::models::tool::ToolDefinition;

/// Provider for OpenAI and every host speaking its chat completions API
/// (OpenRouter, Groq, Fireworks, Ollama, ...).
pub struct OpenAiProvider {
    client: Client,
    config: OpenAiProviderConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiProviderConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        tracing::info!(provider = %config.name, model = %config.model, "using OpenAI-compatible provider");
        Ok(Self { client, config })
    }

    fn get_usage(data: &Value) -> Usage {
        let Some(usage) = data.get("usage") else {
            return Usage::default();
        };

        let input_tokens = usage
            .get("prompt_tokens")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32);

        let output_tokens = usage
            .get("completion_tokens")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32);

        let total_tokens = usage
            .get("total_tokens")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32)
            .or_else(|| match (input_tokens, output_tokens) {
                (Some(input), Some(output)) => Some(input + output),
                _ => None,
            });

        Usage::new(input_tokens, output_tokens, total_tokens)
    }

    fn post(&self, payload: &Value) -> Result<Value> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.host.trim_end_matches('/')
        );

        let mut request = self.client.post(&url).json(payload);
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }
        let response = request.send()?;

        match response.status() {
            StatusCode::OK => Ok(response.json()?),
            status if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 => {
                Err(anyhow!("Server error: {}", status))
            }
            status => {
                let body = response.text().unwrap_or_default();
                Err(anyhow!("Request failed: {} {}", status, body))
            }
        }
    }

    fn failure(&self, message: String) -> ComputerUseError {
        ComputerUseError::Completion {
            provider: self.config.name.clone(),
            message,
        }
    }
}

impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn completion(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
    ) -> ComputerUseResult<Completion> {
        validate_messages(messages)?;

        let mut payload = json!({
            "model": self.config.model,
            "messages": messages_to_openai_spec(messages)?,
        });
        let object = payload
            .as_object_mut()
            .ok_or_else(|| self.failure("payload is not an object".to_string()))?;

        // Add optional parameters
        if let Some(tools) = tools.filter(|tools| !tools.is_empty()) {
            object.insert("tools".to_string(), json!(tools_to_openai_spec(tools)?));
        }
        if let Some(temp) = self.config.temperature {
            object.insert("temperature".to_string(), json!(temp));
        }
        if let Some(tokens) = self.config.max_tokens {
            object.insert("max_tokens".to_string(), json!(tokens));
        }

        tracing::debug!(
            provider = %self.config.name,
            model = %self.config.model,
            messages = messages.len(),
            tools = tools.map_or(0, |t| t.len()),
            "sending completion request"
        );

        let response = self.post(&payload).map_err(|e| {
            from_transport(e, "completion", self.config.timeout.as_secs(), |m| self.failure(m))
        })?;

        // Raise specific error if context length is exceeded
        if let Some(error) = response.get("error") {
            if let Some(message) = check_openai_context_length_error(error) {
                return Err(self.failure(message));
            }
            return Err(self.failure(format!("API error: {}", error)));
        }

        let usage = Self::get_usage(&response);
        Ok(openai_response_to_completion(&response, tools.is_some(), usage))
    }
}
