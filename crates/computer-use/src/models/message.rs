use serde::{Deserialize, Serialize};

use super::content::MessageContent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A message to or from an LLM. Content blocks keep conversation order.
pub struct Message {
    pub role: Role,
    pub content: Vec<MessageContent>,
}

impl Message {
    pub fn new(role: Role) -> Self {
        Message {
            role,
            content: Vec::new(),
        }
    }

    /// Create a new user message
    pub fn user() -> Self {
        Self::new(Role::User)
    }

    /// Create a new assistant message
    pub fn assistant() -> Self {
        Self::new(Role::Assistant)
    }

    /// Create a new system message
    pub fn system() -> Self {
        Self::new(Role::System)
    }

    /// Add any MessageContent to the message
    pub fn with_content(mut self, content: MessageContent) -> Self {
        self.content.push(content);
        self
    }

    /// Add text content to the message
    pub fn with_text<S: Into<String>>(self, text: S) -> Self {
        self.with_content(MessageContent::text(text))
    }

    /// Add an encoded image to the message
    pub fn with_image<B: Into<Vec<u8>>>(self, bytes: B) -> Self {
        self.with_content(MessageContent::image(bytes))
    }

    /// All text blocks joined with newlines
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|content| content.as_text())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn has_image(&self) -> bool {
        self.content.iter().any(|c| matches!(c, MessageContent::Image(_)))
    }
}
