use std::collections::HashSet;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::base::{Completion, Usage};
use crate::errors::{ComputerUseError, ComputerUseResult};
use crate::models::content::{image_mime_type, MessageContent};
use crate::models::message::{Message, Role};
use crate::models::tool::{ToolCall, ToolDefinition};

lazy_static! {
    static ref INVALID_NAME_CHARS: Regex = Regex::new(r"[^a-zA-Z0-9_-]").unwrap();
    static ref VALID_NAME: Regex = Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap();
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
pub enum ImageFormat {
    OpenAi,
    Anthropic,
}

/// Reject requests no backend can answer: an empty conversation or image
/// blocks that are not recognizable encoded images.
pub fn validate_messages(messages: &[Message]) -> ComputerUseResult<()> {
    if messages.is_empty() {
        return Err(ComputerUseError::InvalidInput(
            "at least one message is required".to_string(),
        ));
    }
    for content in messages.iter().flat_map(|m| m.content.iter()) {
        if let MessageContent::Image(bytes) = content {
            image_mime_type(bytes)?;
        }
    }
    Ok(())
}

/// Convert encoded image bytes into an image json block based on format
pub fn convert_image(bytes: &[u8], image_format: &ImageFormat) -> ComputerUseResult<Value> {
    let mime_type = image_mime_type(bytes)?;
    let data = BASE64.encode(bytes);
    Ok(match image_format {
        ImageFormat::OpenAi => json!({
            "type": "image_url",
            "image_url": {
                "url": format!("data:{};base64,{}", mime_type, data)
            }
        }),
        ImageFormat::Anthropic => json!({
            "type": "image",
            "source": {
                "type": "base64",
                "media_type": mime_type,
                "data": data,
            }
        }),
    })
}

fn convert_content(content: &MessageContent, image_format: &ImageFormat) -> ComputerUseResult<Value> {
    match content {
        MessageContent::Text(text) => Ok(json!({"type": "text", "text": text})),
        MessageContent::Image(bytes) => convert_image(bytes, image_format),
    }
}

/// Convert internal Message format to OpenAI's API message specification.
///
/// A message holding a single text block is sent as a plain string; anything
/// else becomes an array of parts in the original order.
pub fn messages_to_openai_spec(messages: &[Message]) -> ComputerUseResult<Vec<Value>> {
    let mut messages_spec = Vec::new();

    for message in messages {
        let content = match message.content.as_slice() {
            [] => continue,
            [MessageContent::Text(text)] => json!(text),
            blocks => Value::Array(
                blocks
                    .iter()
                    .map(|block| convert_content(block, &ImageFormat::OpenAi))
                    .collect::<ComputerUseResult<Vec<_>>>()?,
            ),
        };
        messages_spec.push(json!({
            "role": message.role,
            "content": content,
        }));
    }

    Ok(messages_spec)
}

/// Convert internal Message format to Anthropic's API specification.
///
/// Anthropic takes the system prompt as a top level field, so system messages
/// are lifted out and their text joined.
pub fn messages_to_anthropic_spec(messages: &[Message]) -> ComputerUseResult<(Option<String>, Vec<Value>)> {
    let mut system = Vec::new();
    let mut messages_spec = Vec::new();

    for message in messages {
        if message.role == Role::System {
            let text = message.text();
            if !text.is_empty() {
                system.push(text);
            }
            continue;
        }
        if message.content.is_empty() {
            continue;
        }
        let content = message
            .content
            .iter()
            .map(|block| convert_content(block, &ImageFormat::Anthropic))
            .collect::<ComputerUseResult<Vec<_>>>()?;
        messages_spec.push(json!({
            "role": message.role,
            "content": content,
        }));
    }

    let system = if system.is_empty() {
        None
    } else {
        Some(system.join("\n\n"))
    };
    Ok((system, messages_spec))
}

/// JSON schema for a definition's parameters: each one a required string.
pub fn parameters_schema(tool: &ToolDefinition) -> Value {
    let mut properties = serde_json::Map::new();
    for (name, description) in &tool.params {
        properties.insert(
            name.clone(),
            json!({
                "type": "string",
                "description": description,
            }),
        );
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": tool.required().collect::<Vec<_>>(),
    })
}

fn check_unique_names(tools: &[ToolDefinition]) -> ComputerUseResult<()> {
    let mut tool_names = HashSet::new();
    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(ComputerUseError::InvalidInput(format!(
                "Duplicate tool name: {}",
                tool.name
            )));
        }
    }
    Ok(())
}

/// Convert tool definitions to OpenAI's API tool specification
pub fn tools_to_openai_spec(tools: &[ToolDefinition]) -> ComputerUseResult<Vec<Value>> {
    check_unique_names(tools)?;
    Ok(tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": sanitize_function_name(&tool.name),
                    "description": tool.description,
                    "parameters": parameters_schema(tool),
                }
            })
        })
        .collect())
}

/// Convert tool definitions to Anthropic's API tool specification
pub fn tools_to_anthropic_spec(tools: &[ToolDefinition]) -> ComputerUseResult<Vec<Value>> {
    check_unique_names(tools)?;
    Ok(tools
        .iter()
        .map(|tool| {
            json!({
                "name": sanitize_function_name(&tool.name),
                "description": tool.description,
                "input_schema": parameters_schema(tool),
            })
        })
        .collect())
}

/// Turn one structured tool call into a ToolCall, or None when it must be dropped.
fn structured_tool_call(name: &str, arguments: &Value) -> Option<ToolCall> {
    if !is_valid_function_name(name) {
        tracing::warn!(tool = %name, "dropping tool call with an invalid function name");
        return None;
    }
    let call = ToolCall::from_arguments(name, arguments);
    if call.is_none() {
        tracing::warn!(tool = %name, arguments = %arguments, "dropping tool call with unusable arguments");
    }
    call
}

/// Fill in the tool calls of a completion: the structured calls that survived
/// validation, or, only when the backend returned no structured calls at all,
/// the single call recovered from the response text.
fn finish_completion(
    text: Option<String>,
    structured: Vec<ToolCall>,
    returned_structured: bool,
    usage: Usage,
) -> Completion {
    let mut tool_calls = structured;
    if !returned_structured {
        if let Some(recovered) = text.as_deref().and_then(recover_tool_call) {
            tracing::debug!(tool = %recovered.name, "recovered tool call from response text");
            tool_calls.push(recovered);
        }
    }
    Completion {
        text,
        tool_calls,
        usage,
    }
}

/// Convert OpenAI's API response to a Completion.
///
/// Tool calls are only parsed when tools were offered.
pub fn openai_response_to_completion(response: &Value, with_tools: bool, usage: Usage) -> Completion {
    let original = &response["choices"][0]["message"];
    let text = original
        .get("content")
        .and_then(|c| c.as_str())
        .map(str::to_string);

    if !with_tools {
        return Completion::text_only(text, usage);
    }

    let mut structured = Vec::new();
    let raw_calls = original
        .get("tool_calls")
        .and_then(|t| t.as_array())
        .filter(|calls| !calls.is_empty());
    if let Some(tool_calls) = raw_calls {
        for tool_call in tool_calls {
            let name = tool_call["function"]["name"].as_str().unwrap_or_default();
            let raw = tool_call["function"]["arguments"].as_str().unwrap_or_default();
            match serde_json::from_str::<Value>(raw) {
                Ok(arguments) => structured.extend(structured_tool_call(name, &arguments)),
                Err(e) => {
                    tracing::warn!(tool = %name, error = %e, "could not interpret tool call arguments: {}", raw);
                }
            }
        }
    }

    finish_completion(text, structured, raw_calls.is_some(), usage)
}

/// Convert Anthropic's API response to a Completion.
pub fn anthropic_response_to_completion(response: &Value, with_tools: bool, usage: Usage) -> Completion {
    let blocks = response
        .get("content")
        .and_then(|c| c.as_array())
        .cloned()
        .unwrap_or_default();

    let texts: Vec<&str> = blocks
        .iter()
        .filter(|block| block["type"] == "text")
        .filter_map(|block| block["text"].as_str())
        .collect();
    let text = if texts.is_empty() {
        None
    } else {
        Some(texts.join("\n"))
    };

    if !with_tools {
        return Completion::text_only(text, usage);
    }

    let tool_uses: Vec<&Value> = blocks.iter().filter(|block| block["type"] == "tool_use").collect();
    let structured = tool_uses
        .iter()
        .filter_map(|block| {
            let name = block["name"].as_str().unwrap_or_default();
            structured_tool_call(name, &block["input"])
        })
        .collect();

    finish_completion(text, structured, !tool_uses.is_empty(), usage)
}

/// Best effort recovery of a tool call that a backend wrote into its text
/// instead of using the tool calling channel.
///
/// Scans for the first embedded JSON object carrying a string `name` and an
/// object `parameters`. Everything else in the text is ignored.
pub fn recover_tool_call(text: &str) -> Option<ToolCall> {
    text.match_indices('{').find_map(|(start, _)| {
        let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        let value = stream.next()?.ok()?;
        let name = value.get("name")?.as_str()?;
        ToolCall::from_arguments(name, value.get("parameters")?)
    })
}

pub fn sanitize_function_name(name: &str) -> String {
    INVALID_NAME_CHARS.replace_all(name, "_").to_string()
}

pub fn is_valid_function_name(name: &str) -> bool {
    VALID_NAME.is_match(name)
}

pub fn check_openai_context_length_error(error: &Value) -> Option<String> {
    let code = error.get("code")?.as_str()?;
    if code == "context_length_exceeded" || code == "string_above_max_length" {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error");
        Some(format!("Input message too long. Message: {}", message))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::action::action_definitions;
    use serde_json::json;

    const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    const OPENAI_TOOL_USE_RESPONSE: &str = r#"{
        "choices": [{
            "role": "assistant",
            "message": {
                "content": null,
                "tool_calls": [{
                    "id": "1",
                    "function": {
                        "name": "click",
                        "arguments": "{\"query\": \"Submit button\"}"
                    }
                }]
            }
        }]
    }"#;

    #[test]
    fn test_messages_to_openai_spec() -> anyhow::Result<()> {
        let messages = vec![
            Message::system().with_text("You operate a desktop."),
            Message::user().with_text("Hello"),
            Message::user()
                .with_text("before")
                .with_image(PNG_BYTES.to_vec())
                .with_text("after"),
        ];
        let spec = messages_to_openai_spec(&messages)?;

        assert_eq!(spec.len(), 3);
        assert_eq!(spec[0]["role"], "system");
        assert_eq!(spec[1]["role"], "user");
        assert_eq!(spec[1]["content"], "Hello");

        let parts = spec[2]["content"].as_array().unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], json!({"type": "text", "text": "before"}));
        assert_eq!(parts[1]["type"], "image_url");
        assert!(parts[1]["image_url"]["url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));
        assert_eq!(parts[2], json!({"type": "text", "text": "after"}));
        Ok(())
    }

    #[test]
    fn test_messages_to_anthropic_spec() -> anyhow::Result<()> {
        let messages = vec![
            Message::system().with_text("You operate a desktop."),
            Message::user().with_image(PNG_BYTES.to_vec()).with_text("Where is OK?"),
            Message::assistant().with_text("Top right."),
        ];
        let (system, spec) = messages_to_anthropic_spec(&messages)?;

        assert_eq!(system.as_deref(), Some("You operate a desktop."));
        assert_eq!(spec.len(), 2);
        assert_eq!(spec[0]["role"], "user");
        assert_eq!(spec[0]["content"][0]["type"], "image");
        assert_eq!(spec[0]["content"][0]["source"]["media_type"], "image/png");
        assert_eq!(spec[0]["content"][0]["source"]["data"], BASE64.encode(PNG_BYTES));
        assert_eq!(spec[0]["content"][1]["text"], "Where is OK?");
        assert_eq!(spec[1]["role"], "assistant");
        Ok(())
    }

    #[test]
    fn test_validate_messages() {
        assert!(matches!(
            validate_messages(&[]),
            Err(ComputerUseError::InvalidInput(_))
        ));
        assert!(matches!(
            validate_messages(&[Message::user().with_image(b"not an image".to_vec())]),
            Err(ComputerUseError::InvalidImage(_))
        ));
        assert!(validate_messages(&[Message::user().with_image(PNG_BYTES.to_vec())]).is_ok());
    }

    #[test]
    fn test_tools_to_openai_spec() -> anyhow::Result<()> {
        let spec = tools_to_openai_spec(&action_definitions())?;

        assert_eq!(spec.len(), 8);
        assert_eq!(spec[0]["type"], "function");
        assert_eq!(spec[0]["function"]["name"], "stop");
        assert_eq!(spec[0]["function"]["parameters"]["required"], json!([]));

        let send_key = &spec[3]["function"];
        assert_eq!(send_key["name"], "send_key");
        assert_eq!(
            send_key["parameters"],
            json!({
                "type": "object",
                "properties": {
                    "name": {
                        "type": "string",
                        "description": "The key or key combination (e.g., 'Ctrl-C')"
                    }
                },
                "required": ["name"]
            })
        );
        Ok(())
    }

    #[test]
    fn test_tools_to_anthropic_spec() -> anyhow::Result<()> {
        let spec = tools_to_anthropic_spec(&action_definitions())?;
        assert_eq!(spec[5]["name"], "click");
        assert_eq!(spec[5]["input_schema"]["required"], json!(["query"]));
        assert_eq!(spec[5]["input_schema"]["properties"]["query"]["type"], "string");
        Ok(())
    }

    #[test]
    fn test_tools_spec_duplicate() {
        let tools = vec![
            ToolDefinition::new("click", "Click"),
            ToolDefinition::new("click", "Click again"),
        ];
        let result = tools_to_openai_spec(&tools);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Duplicate tool name"));
        assert!(tools_to_anthropic_spec(&tools).is_err());
    }

    #[test]
    fn test_tools_spec_empty() -> anyhow::Result<()> {
        assert!(tools_to_openai_spec(&[])?.is_empty());
        Ok(())
    }

    #[test]
    fn test_openai_response_round_trip() -> anyhow::Result<()> {
        let tools = action_definitions();
        let spec = tools_to_openai_spec(&tools)?;
        let click = spec
            .iter()
            .find(|t| t["function"]["name"] == "click")
            .unwrap();
        assert_eq!(click["function"]["parameters"]["required"], json!(["query"]));

        let response: Value = serde_json::from_str(OPENAI_TOOL_USE_RESPONSE)?;
        let completion = openai_response_to_completion(&response, true, Usage::default());

        assert!(completion.text.is_none());
        assert_eq!(completion.tool_calls.len(), 1);
        assert_eq!(completion.tool_calls[0].name, "click");
        assert_eq!(completion.tool_calls[0].parameters["query"], "Submit button");
        Ok(())
    }

    #[test]
    fn test_openai_response_without_tools_is_text_only() -> anyhow::Result<()> {
        let mut response: Value = serde_json::from_str(OPENAI_TOOL_USE_RESPONSE)?;
        response["choices"][0]["message"]["content"] =
            json!(r#"{"name": "stop", "parameters": {}}"#);
        let completion = openai_response_to_completion(&response, false, Usage::default());
        assert!(completion.tool_calls.is_empty());
        assert!(completion.text.is_some());
        Ok(())
    }

    #[test]
    fn test_openai_response_drops_bad_arguments() -> anyhow::Result<()> {
        let mut response: Value = serde_json::from_str(OPENAI_TOOL_USE_RESPONSE)?;
        let calls = response["choices"][0]["message"]["tool_calls"].as_array_mut().unwrap();
        calls.push(json!({
            "id": "2",
            "function": {"name": "type_text", "arguments": "invalid json {"}
        }));
        calls.push(json!({
            "id": "3",
            "function": {"name": "invalid fn", "arguments": "{}"}
        }));

        let completion = openai_response_to_completion(&response, true, Usage::default());
        assert_eq!(completion.tool_calls.len(), 1);
        assert_eq!(completion.tool_calls[0].name, "click");
        Ok(())
    }

    #[test]
    fn test_openai_response_recovers_inline_call() {
        let response = json!({
            "choices": [{
                "message": {
                    "content": "Sure, here you go: {\"name\": \"type_text\", \"parameters\": {\"text\": \"hello\"}} done."
                }
            }]
        });
        let completion = openai_response_to_completion(&response, true, Usage::default());
        assert_eq!(completion.tool_calls.len(), 1);
        assert_eq!(completion.tool_calls[0].name, "type_text");
        assert_eq!(completion.tool_calls[0].parameters["text"], "hello");
        assert!(completion.text.unwrap().starts_with("Sure"));
    }

    #[test]
    fn test_structured_calls_suppress_recovery() -> anyhow::Result<()> {
        let mut response: Value = serde_json::from_str(OPENAI_TOOL_USE_RESPONSE)?;
        response["choices"][0]["message"]["content"] =
            json!(r#"{"name": "stop", "parameters": {}}"#);
        let completion = openai_response_to_completion(&response, true, Usage::default());
        assert_eq!(completion.tool_calls.len(), 1);
        assert_eq!(completion.tool_calls[0].name, "click");
        Ok(())
    }

    #[test]
    fn test_dropped_structured_calls_suppress_recovery() {
        let response = json!({
            "choices": [{
                "message": {
                    "content": "{\"name\": \"stop\", \"parameters\": {}}",
                    "tool_calls": [{
                        "id": "1",
                        "type": "function",
                        "function": {"name": "click", "arguments": "not json"}
                    }]
                }
            }]
        });
        let completion = openai_response_to_completion(&response, true, Usage::default());
        assert!(completion.tool_calls.is_empty());

        let response = json!({
            "content": [
                {"type": "text", "text": "{\"name\": \"stop\", \"parameters\": {}}"},
                {"type": "tool_use", "id": "toolu_1", "name": "click", "input": "oops"}
            ]
        });
        let completion = anthropic_response_to_completion(&response, true, Usage::default());
        assert!(completion.tool_calls.is_empty());
    }

    #[test]
    fn test_empty_tool_call_array_allows_recovery() {
        let response = json!({
            "choices": [{
                "message": {
                    "content": "{\"name\": \"stop\", \"parameters\": {}}",
                    "tool_calls": []
                }
            }]
        });
        let completion = openai_response_to_completion(&response, true, Usage::default());
        assert_eq!(completion.tool_calls.len(), 1);
        assert_eq!(completion.tool_calls[0].name, "stop");
    }

    #[test]
    fn test_anthropic_response_to_completion() {
        let response = json!({
            "content": [
                {"type": "text", "text": "Clicking it."},
                {"type": "tool_use", "id": "toolu_1", "name": "click", "input": {"query": "OK"}},
                {"type": "tool_use", "id": "toolu_2", "name": "type_text", "input": "oops"}
            ]
        });
        let completion = anthropic_response_to_completion(&response, true, Usage::default());
        assert_eq!(completion.text.as_deref(), Some("Clicking it."));
        assert_eq!(completion.tool_calls.len(), 1);
        assert_eq!(completion.tool_calls[0].parameters["query"], "OK");

        let completion = anthropic_response_to_completion(&response, false, Usage::default());
        assert!(completion.tool_calls.is_empty());
    }

    #[test]
    fn test_recover_tool_call() {
        let call = recover_tool_call(
            "I will press enter.\n{\n  \"name\": \"send_key\",\n  \"parameters\": {\"name\": \"Return\"}\n}",
        )
        .unwrap();
        assert_eq!(call.name, "send_key");
        assert_eq!(call.parameters["name"], "Return");

        // first object lacks the keys, the second one is used
        let call = recover_tool_call(r#"{"note": 1} then {"name": "stop", "parameters": {}}"#).unwrap();
        assert_eq!(call.name, "stop");
        assert!(call.parameters.is_empty());

        assert!(recover_tool_call("no json here").is_none());
        assert!(recover_tool_call(r#"{"name": "click"}"#).is_none());
        assert!(recover_tool_call(r#"{"parameters": {"query": "x"}}"#).is_none());
        assert!(recover_tool_call(r#"{"name": "click", "parameters": "x"}"#).is_none());
        assert!(recover_tool_call("{ broken").is_none());
    }

    #[test]
    fn test_sanitize_function_name() {
        assert_eq!(sanitize_function_name("hello-world"), "hello-world");
        assert_eq!(sanitize_function_name("hello world"), "hello_world");
        assert_eq!(sanitize_function_name("hello@world"), "hello_world");
    }

    #[test]
    fn test_is_valid_function_name() {
        assert!(is_valid_function_name("hello-world"));
        assert!(is_valid_function_name("hello_world"));
        assert!(!is_valid_function_name("hello world"));
        assert!(!is_valid_function_name("hello@world"));
        assert!(!is_valid_function_name(""));
    }

    #[test]
    fn test_check_openai_context_length_error() {
        let error = json!({
            "code": "context_length_exceeded",
            "message": "This message is too long"
        });
        assert_eq!(
            check_openai_context_length_error(&error).as_deref(),
            Some("Input message too long. Message: This message is too long")
        );

        let error = json!({
            "code": "other_error",
            "message": "Some other error"
        });
        assert!(check_openai_context_length_error(&error).is_none());
    }
}
