use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComputerUseError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Missing parameter `{parameter}` for action {action}")]
    MissingParameter { action: String, parameter: String },

    #[error("Grounding failed: {0}")]
    Grounding(String),

    #[error("Completion failed ({provider}): {message}")]
    Completion { provider: String, message: String },

    #[error("Effector failed: {0}")]
    Effector(String),

    #[error("{stage} timed out after {seconds}s")]
    Timeout { stage: String, seconds: u64 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ComputerUseError {
    /// Short name of the stage that produced the error, used in log lines.
    pub fn stage(&self) -> &'static str {
        match self {
            ComputerUseError::Parse(_) => "parse",
            ComputerUseError::UnknownAction(_) => "validate",
            ComputerUseError::MissingParameter { .. } => "validate",
            ComputerUseError::Grounding(_) => "grounding",
            ComputerUseError::Completion { .. } => "completion",
            ComputerUseError::Effector(_) => "execute",
            ComputerUseError::Timeout { .. } => "timeout",
            ComputerUseError::InvalidInput(_) => "input",
            ComputerUseError::InvalidImage(_) => "input",
            ComputerUseError::Config(_) => "config",
        }
    }
}

pub type ComputerUseResult<T> = Result<T, ComputerUseError>;

/// Map an error from a blocking HTTP call into the taxonomy, keeping timeouts typed.
pub(crate) fn from_transport(
    err: anyhow::Error,
    stage: &str,
    timeout_secs: u64,
    otherwise: impl FnOnce(String) -> ComputerUseError,
) -> ComputerUseError {
    let timed_out = err
        .chain()
        .filter_map(|cause| cause.downcast_ref::<reqwest::Error>())
        .any(|e| e.is_timeout());
    if timed_out {
        ComputerUseError::Timeout {
            stage: stage.to_string(),
            seconds: timeout_secs,
        }
    } else {
        otherwise(format!("{:#}", err))
    }
}
