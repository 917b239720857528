//! These models represent the objects passed between the dispatcher, the providers
//! and the grounding backend.
//!
//! There are several related formats we need to interact with:
//! - operator commands, one `<action> {json}` line per turn
//! - openai chat completion messages/tools, sent to OpenAI-compatible backends
//! - anthropic messages/tools, sent to the Anthropic API
//!
//! We always convert those wire formats into the internal structs at the provider
//! boundary, so the internal models are not an exact match to any of them.
pub mod action;
pub mod content;
pub mod message;
pub mod tool;
