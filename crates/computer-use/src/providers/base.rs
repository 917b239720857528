use serde::{Deserialize, Serialize};

use crate::errors::ComputerUseResult;
use crate::models::message::Message;
use crate::models::tool::{ToolCall, ToolDefinition};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }
}

/// The normalized result of a completion call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    /// Raw response text, if the backend returned any
    pub text: Option<String>,
    /// Structured tool calls, or the single call recovered from the text
    pub tool_calls: Vec<ToolCall>,
    pub usage: Usage,
}

impl Completion {
    pub fn text_only(text: Option<String>, usage: Usage) -> Self {
        Self {
            text,
            tool_calls: Vec::new(),
            usage,
        }
    }
}

/// Base trait for chat backends (OpenAI-compatible hosts, Anthropic, ...)
///
/// Calls block until the backend answers or the configured timeout elapses.
/// Nothing is retried here; retry policy belongs to the caller.
pub trait Provider: Send + Sync {
    /// Identifier used in logs and in `Completion` errors
    fn name(&self) -> &str;

    /// Backend model id after alias resolution
    fn model(&self) -> &str;

    /// Generate the next response. When `tools` is `None` only text is returned.
    fn completion(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
    ) -> ComputerUseResult<Completion>;
}
