use anyhow::{anyhow, Result};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde_json::{json, Value};

use super::base::{Completion, Provider, Usage};
use super::configs::{AnthropicProviderConfig, DEFAULT_MAX_TOKENS};
use super::utils::{
    anthropic_response_to_completion, messages_to_anthropic_spec, tools_to_anthropic_spec,
    validate_messages,
};
use crate::errors::{from_transport, ComputerUseError, ComputerUseResult};
use crate::models::message::Message;
use crate::models::tool::ToolDefinition;

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: Client,
    config: AnthropicProviderConfig,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicProviderConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        tracing::info!(model = %config.model, "using Anthropic provider");
        Ok(Self { client, config })
    }

    fn get_usage(data: &Value) -> Usage {
        let usage = &data["usage"];
        let input_tokens = usage["input_tokens"].as_i64().map(|v| v as i32);
        let output_tokens = usage["output_tokens"].as_i64().map(|v| v as i32);
        let total_tokens = match (input_tokens, output_tokens) {
            (Some(input), Some(output)) => Some(input + output),
            _ => None,
        };
        Usage::new(input_tokens, output_tokens, total_tokens)
    }

    fn post(&self, payload: &Value) -> Result<Value> {
        let url = format!("{}/v1/messages", self.config.host.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(payload)
            .send()?;

        match response.status() {
            StatusCode::OK => Ok(response.json()?),
            status if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 => {
                Err(anyhow!("Server error: {}", status))
            }
            status => {
                let error_text = response.text().unwrap_or_default();
                Err(anyhow!("Request failed: {} - {}", status, error_text))
            }
        }
    }

    fn failure(&self, message: String) -> ComputerUseError {
        ComputerUseError::Completion {
            provider: self.name().to_string(),
            message,
        }
    }
}

impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
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
        let (system, anthropic_messages) = messages_to_anthropic_spec(messages)?;
        if anthropic_messages.is_empty() {
            return Err(ComputerUseError::InvalidInput(
                "Anthropic requires at least one user or assistant message".to_string(),
            ));
        }

        let mut payload = json!({
            "model": self.config.model,
            "messages": anthropic_messages,
            "max_tokens": self.config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        });
        let object = payload
            .as_object_mut()
            .ok_or_else(|| self.failure("payload is not an object".to_string()))?;

        if let Some(system) = system {
            object.insert("system".to_string(), json!(system));
        }
        if let Some(tools) = tools.filter(|tools| !tools.is_empty()) {
            object.insert("tools".to_string(), json!(tools_to_anthropic_spec(tools)?));
        }
        if let Some(temp) = self.config.temperature {
            object.insert("temperature".to_string(), json!(temp));
        }

        tracing::debug!(
            model = %self.config.model,
            messages = messages.len(),
            tools = tools.map_or(0, |t| t.len()),
            "sending Anthropic messages request"
        );

        let response = self.post(&payload).map_err(|e| {
            from_transport(e, "completion", self.config.timeout.as_secs(), |m| self.failure(m))
        })?;

        if response["type"] == "error" {
            return Err(self.failure(format!("API error: {}", response["error"])));
        }

        let usage = Self::get_usage(&response);
        Ok(anthropic_response_to_completion(&response, tools.is_some(), usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::action::action_definitions;
    use crate::providers::configs::DEFAULT_TIMEOUT;
    use mockito::{Matcher, Server, ServerGuard};

    fn setup_provider(server: &ServerGuard) -> AnthropicProvider {
        let config = AnthropicProviderConfig {
            host: server.url(),
            api_key: "test_api_key".to_string(),
            model: "claude-3-5-sonnet-20241022".to_string(),
            temperature: Some(0.7),
            max_tokens: None,
            timeout: DEFAULT_TIMEOUT,
        };
        AnthropicProvider::new(config).unwrap()
    }

    #[test]
    fn test_completion_basic() -> anyhow::Result<()> {
        let mut server = Server::new();
        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "test_api_key")
            .match_header("anthropic-version", ANTHROPIC_VERSION)
            .match_body(Matcher::PartialJson(json!({
                "system": "You are a helpful assistant.",
                "max_tokens": DEFAULT_MAX_TOKENS
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "id": "msg_123",
                    "type": "message",
                    "role": "assistant",
                    "content": [{
                        "type": "text",
                        "text": "Hello! How can I assist you today?"
                    }],
                    "model": "claude-3-5-sonnet-20241022",
                    "stop_reason": "end_turn",
                    "stop_sequence": null,
                    "usage": {
                        "input_tokens": 12,
                        "output_tokens": 15
                    }
                })
                .to_string(),
            )
            .create();

        let provider = setup_provider(&server);
        let messages = vec![
            Message::system().with_text("You are a helpful assistant."),
            Message::user().with_text("Hello?"),
        ];
        let completion = provider.completion(&messages, None)?;

        mock.assert();
        assert_eq!(
            completion.text.as_deref(),
            Some("Hello! How can I assist you today?")
        );
        assert_eq!(completion.usage, Usage::new(Some(12), Some(15), Some(27)));
        Ok(())
    }

    #[test]
    fn test_completion_tool_use() -> anyhow::Result<()> {
        let mut server = Server::new();
        let mock = server
            .mock("POST", "/v1/messages")
            .match_body(Matcher::Regex(r#""input_schema""#.to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "type": "message",
                    "role": "assistant",
                    "content": [{
                        "type": "tool_use",
                        "id": "toolu_01",
                        "name": "type_text",
                        "input": {"text": "hello"}
                    }],
                    "stop_reason": "tool_use",
                    "usage": {"input_tokens": 40, "output_tokens": 10}
                })
                .to_string(),
            )
            .create();

        let provider = setup_provider(&server);
        let tools = action_definitions();
        let completion = provider.completion(&[Message::user().with_text("Say hello")], Some(&tools))?;

        mock.assert();
        assert!(completion.text.is_none());
        assert_eq!(completion.tool_calls.len(), 1);
        assert_eq!(completion.tool_calls[0].name, "type_text");
        assert_eq!(completion.tool_calls[0].parameters["text"], "hello");
        Ok(())
    }

    #[test]
    fn test_completion_request_failure() {
        let mut server = Server::new();
        server
            .mock("POST", "/v1/messages")
            .with_status(400)
            .with_body(r#"{"type":"error","error":{"type":"invalid_request_error"}}"#)
            .create();

        let provider = setup_provider(&server);
        let err = provider
            .completion(&[Message::user().with_text("Hello?")], None)
            .unwrap_err();
        match err {
            ComputerUseError::Completion { provider, message } => {
                assert_eq!(provider, "anthropic");
                assert!(message.contains("invalid_request_error"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_system_only_conversation_is_rejected() {
        let server = Server::new();
        let provider = setup_provider(&server);
        assert!(matches!(
            provider.completion(&[Message::system().with_text("rules")], None),
            Err(ComputerUseError::InvalidInput(_))
        ));
    }
}
