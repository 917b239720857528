use crate::errors::ComputerUseResult;
use crate::models::action::action_definitions;
use crate::models::message::Message;
use crate::models::tool::ToolCall;
use crate::providers::base::Provider;

const SYSTEM_PROMPT: &str = "You operate a desktop computer on behalf of the user. \
Choose the single next action that moves the task forward and call exactly one tool. \
UI elements are referred to by a short visual description, for example \"the blue Submit button\". \
Call stop once the task is complete.";

/// Ask `provider` for the next action towards `instruction`.
///
/// Returns the first suggested call naming a known action, or `None` when the
/// model answered without one.
pub fn translate(
    provider: &dyn Provider,
    instruction: &str,
    screenshot: Option<&[u8]>,
) -> ComputerUseResult<Option<ToolCall>> {
    let definitions = action_definitions();

    let mut request = Message::user().with_text(instruction);
    if let Some(bytes) = screenshot {
        request = request.with_image(bytes);
    }
    let messages = vec![Message::system().with_text(SYSTEM_PROMPT), request];

    let completion = provider.completion(&messages, Some(&definitions))?;
    tracing::debug!(
        provider = %provider.name(),
        model = %provider.model(),
        calls = completion.tool_calls.len(),
        "translated instruction"
    );

    let call = completion
        .tool_calls
        .into_iter()
        .find(|call| definitions.iter().any(|d| d.name == call.name));
    if call.is_none() {
        tracing::warn!(text = ?completion.text, "model suggested no known action");
    }
    Ok(call)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ComputerUseError;
    use crate::models::message::Role;
    use crate::providers::base::{Completion, Usage};
    use crate::providers::mock::MockProvider;
    use std::collections::BTreeMap;

    fn call(name: &str, pairs: &[(&str, &str)]) -> ToolCall {
        let parameters: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ToolCall::new(name, parameters)
    }

    #[test]
    fn test_translate_picks_first_known_action() {
        let provider = MockProvider::new(vec![Ok(Completion {
            text: None,
            tool_calls: vec![
                call("launch_rocket", &[]),
                call("click", &[("query", "Submit button")]),
                call("stop", &[]),
            ],
            usage: Usage::default(),
        })]);

        let suggestion = translate(&provider, "submit the form", Some(&b"png"[..])).unwrap();
        assert_eq!(suggestion, Some(call("click", &[("query", "Submit button")])));

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0][0].role, Role::System);
        assert_eq!(requests[0][1].text(), "submit the form");
        assert!(requests[0][1].has_image());
    }

    #[test]
    fn test_translate_without_suggestion() {
        let provider = MockProvider::new(vec![Ok(Completion::text_only(
            Some("I am not sure what to do.".to_string()),
            Usage::default(),
        ))]);
        assert_eq!(translate(&provider, "do something", None).unwrap(), None);
        assert!(!provider.requests()[0][1].has_image());
    }

    #[test]
    fn test_translate_propagates_provider_errors() {
        let provider = MockProvider::new(vec![Err(ComputerUseError::Timeout {
            stage: "completion".to_string(),
            seconds: 120,
        })]);
        assert!(matches!(
            translate(&provider, "open the browser", None),
            Err(ComputerUseError::Timeout { .. })
        ));
    }
}
