use std::collections::BTreeMap;

use strum_macros::IntoStaticStr;

use super::tool::ToolDefinition;
use crate::errors::{ComputerUseError, ComputerUseResult};

/// The fixed action set, each variant carrying only what its definition declares.
#[derive(Debug, Clone, PartialEq, Eq, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Action {
    Stop,
    RunCommand { command: String },
    RunBackgroundCommand { command: String },
    SendKey { name: String },
    TypeText { text: String },
    Click { query: String },
    DoubleClick { query: String },
    RightClick { query: String },
}

/// The definition table for the action set, in the order it is presented to models.
pub fn action_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::new("stop", "Indicate that the task has been completed."),
        ToolDefinition::new("run_command", "Run a shell command.")
            .with_param("command", "The command to run"),
        ToolDefinition::new("run_background_command", "Run a shell command in the background.")
            .with_param("command", "The command to run"),
        ToolDefinition::new("send_key", "Send a key or combination of keys to the system.")
            .with_param("name", "The key or key combination (e.g., 'Ctrl-C')"),
        ToolDefinition::new("type_text", "Type a specified text into the system.")
            .with_param("text", "The text to type"),
        ToolDefinition::new("click", "Click on a specified UI element.")
            .with_param("query", "The element or location to click"),
        ToolDefinition::new("double_click", "Double-click on a specified UI element.")
            .with_param("query", "The element or location to double-click"),
        ToolDefinition::new("right_click", "Right-click on a specified UI element.")
            .with_param("query", "The element or location to right-click"),
    ]
}

impl Action {
    pub fn name(&self) -> &'static str {
        self.into()
    }

    /// Build an action from its name and string parameters.
    pub fn from_parameters(name: &str, params: &BTreeMap<String, String>) -> ComputerUseResult<Self> {
        let take = |parameter: &str| {
            params
                .get(parameter)
                .cloned()
                .ok_or_else(|| ComputerUseError::MissingParameter {
                    action: name.to_string(),
                    parameter: parameter.to_string(),
                })
        };

        let action = match name {
            "stop" => Action::Stop,
            "run_command" => Action::RunCommand {
                command: take("command")?,
            },
            "run_background_command" => Action::RunBackgroundCommand {
                command: take("command")?,
            },
            "send_key" => Action::SendKey { name: take("name")? },
            "type_text" => Action::TypeText { text: take("text")? },
            "click" => Action::Click { query: take("query")? },
            "double_click" => Action::DoubleClick { query: take("query")? },
            "right_click" => Action::RightClick { query: take("query")? },
            other => return Err(ComputerUseError::UnknownAction(other.to_string())),
        };
        Ok(action)
    }

    /// The element description for actions that need grounding.
    pub fn query(&self) -> Option<&str> {
        match self {
            Action::Click { query } | Action::DoubleClick { query } | Action::RightClick { query } => {
                Some(query)
            }
            _ => None,
        }
    }

    pub fn is_spatial(&self) -> bool {
        self.query().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_definitions_cover_every_action() {
        let definitions = action_definitions();
        assert_eq!(definitions.len(), 8);

        for definition in &definitions {
            let supplied = definition
                .required()
                .map(|name| (name.to_string(), "x".to_string()))
                .collect();
            let action = Action::from_parameters(&definition.name, &supplied).unwrap();
            assert_eq!(action.name(), definition.name);
        }
    }

    #[test]
    fn test_from_parameters() {
        let action = Action::from_parameters("click", &params(&[("query", "Submit button")])).unwrap();
        assert_eq!(
            action,
            Action::Click {
                query: "Submit button".to_string()
            }
        );
        assert!(action.is_spatial());
        assert_eq!(action.query(), Some("Submit button"));

        let action = Action::from_parameters("type_text", &params(&[("text", "hello")])).unwrap();
        assert!(!action.is_spatial());
    }

    #[test]
    fn test_from_parameters_errors() {
        assert_eq!(
            Action::from_parameters("send_key", &params(&[])),
            Err(ComputerUseError::MissingParameter {
                action: "send_key".to_string(),
                parameter: "name".to_string()
            })
        );
        assert_eq!(
            Action::from_parameters("scroll", &params(&[])),
            Err(ComputerUseError::UnknownAction("scroll".to_string()))
        );
    }
}
