use serde::{Deserialize, Serialize};

use crate::errors::{ComputerUseError, ComputerUseResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
/// Content passed inside a message. Images hold the raw encoded bytes; any
/// provider specific encoding happens when the request is built.
pub enum MessageContent {
    Text(String),
    Image(Vec<u8>),
}

impl MessageContent {
    pub fn text<S: Into<String>>(text: S) -> Self {
        MessageContent::Text(text.into())
    }

    pub fn image<B: Into<Vec<u8>>>(bytes: B) -> Self {
        MessageContent::Image(bytes.into())
    }

    /// Get the text content if this is a Text variant
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Get the image bytes if this is an Image variant
    pub fn as_image(&self) -> Option<&[u8]> {
        match self {
            MessageContent::Image(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// Sniff the mime type of encoded image bytes.
pub fn image_mime_type(bytes: &[u8]) -> ComputerUseResult<&'static str> {
    image::guess_format(bytes)
        .map(|format| format.to_mime_type())
        .map_err(|e| ComputerUseError::InvalidImage(e.to_string()))
}
