use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool that can be offered to a model.
///
/// Every declared parameter is a required string; the description is the only
/// place to express anything richer (formats, allowed values).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The name of the tool, unique within a definition table
    pub name: String,
    /// A description of what the tool does
    pub description: String,
    /// Parameter names and their human readable descriptions, in declaration order
    pub params: Vec<(String, String)>,
}

impl ToolDefinition {
    pub fn new<N, D>(name: N, description: D) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        ToolDefinition {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
        }
    }

    pub fn with_param<N, D>(mut self, name: N, description: D) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        self.params.push((name.into(), description.into()));
        self
    }

    /// Names of the required parameters, which is every declared parameter.
    pub fn required(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|(name, _)| name.as_str())
    }

    /// Signature line such as `click(query)`
    pub fn signature(&self) -> String {
        format!("{}({})", self.name, self.required().collect::<Vec<_>>().join(", "))
    }
}

/// A tool invocation requested by a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub parameters: BTreeMap<String, String>,
}

impl ToolCall {
    pub fn new<S: Into<String>>(name: S, parameters: BTreeMap<String, String>) -> Self {
        ToolCall {
            name: name.into(),
            parameters,
        }
    }

    /// Build a call from a JSON arguments object. Strings are kept verbatim and
    /// scalars are stringified; returns None for anything that is not an object
    /// of scalars.
    pub fn from_arguments<S: Into<String>>(name: S, arguments: &Value) -> Option<Self> {
        let object = arguments.as_object()?;
        let mut parameters = BTreeMap::new();
        for (key, value) in object {
            parameters.insert(key.clone(), scalar_to_string(value)?);
        }
        Some(Self::new(name, parameters))
    }

    /// Render as an operator command line, `<name> {json}`.
    pub fn to_command(&self) -> String {
        let arguments = serde_json::to_string(&self.parameters).unwrap_or_else(|_| "{}".to_string());
        format!("{} {}", self.name, arguments)
    }
}

pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
