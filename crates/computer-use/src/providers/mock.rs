use std::sync::{Arc, Mutex};

use super::base::{Completion, Provider, Usage};
use crate::errors::ComputerUseResult;
use crate::models::message::Message;
use crate::models::tool::ToolDefinition;

/// A mock provider that returns pre-configured responses for testing
pub struct MockProvider {
    responses: Arc<Mutex<Vec<ComputerUseResult<Completion>>>>,
    requests: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of responses
    pub fn new(responses: Vec<ComputerUseResult<Completion>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The conversations the provider was called with, oldest first
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    fn completion(
        &self,
        messages: &[Message],
        _tools: Option<&[ToolDefinition]>,
    ) -> ComputerUseResult<Completion> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(messages.to_vec());
        }
        let mut responses = match self.responses.lock() {
            Ok(responses) => responses,
            Err(poisoned) => poisoned.into_inner(),
        };
        if responses.is_empty() {
            // Return empty response if no more pre-configured responses
            Ok(Completion::text_only(Some(String::new()), Usage::default()))
        } else {
            responses.remove(0)
        }
    }
}
