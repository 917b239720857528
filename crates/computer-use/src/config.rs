use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{ComputerUseError, ComputerUseResult};
use crate::grounding::osatlas::OsAtlasConfig;
use crate::providers::configs::{ProviderConfig, ProviderKind, DEFAULT_TIMEOUT};

/// Helper to read an environment variable, failing only when it is required.
pub fn get_env(key: &str, required: bool, default: Option<String>) -> ComputerUseResult<Option<String>> {
    match env::var(key) {
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) if !required => Ok(default),
        Err(env::VarError::NotPresent) => Err(ComputerUseError::Config(format!(
            "Environment variable '{}' is required but not set.",
            key
        ))),
        Err(e) => Err(ComputerUseError::Config(format!("{}: {}", key, e))),
    }
}

/// What to do with a spatial action whose element could not be located.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroundingPolicy {
    /// Log the failure and skip the actuation
    Fail,
    /// Actuate at the current cursor position
    #[default]
    FallbackToDefault,
    /// Re-query up to `attempts` more times, then fall back to the cursor position
    Retry { attempts: u32 },
}

impl FromStr for GroundingPolicy {
    type Err = ComputerUseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        match s.as_str() {
            "fail" => Ok(GroundingPolicy::Fail),
            "fallback" | "fallback-to-default" => Ok(GroundingPolicy::FallbackToDefault),
            _ => {
                let attempts = s
                    .strip_prefix("retry")
                    .map(|rest| rest.trim_start_matches(':'))
                    .ok_or_else(|| ComputerUseError::Config(format!("Unknown grounding policy: {}", s)))?;
                let attempts = if attempts.is_empty() {
                    1
                } else {
                    attempts
                        .parse()
                        .map_err(|_| ComputerUseError::Config(format!("Invalid retry count: {}", attempts)))?
                };
                Ok(GroundingPolicy::Retry { attempts })
            }
        }
    }
}

impl fmt::Display for GroundingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroundingPolicy::Fail => write!(f, "fail"),
            GroundingPolicy::FallbackToDefault => write!(f, "fallback"),
            GroundingPolicy::Retry { attempts } => write!(f, "retry:{}", attempts),
        }
    }
}

/// Coordinate system the grounding backend answers in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoordinateSpace {
    /// Screenshot pixels
    #[default]
    Pixels,
    /// A 0..scale grid over each axis, rescaled to pixels
    Normalized { scale: u32 },
}

impl FromStr for CoordinateSpace {
    type Err = ComputerUseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        if s == "pixels" {
            return Ok(CoordinateSpace::Pixels);
        }
        let scale = s
            .strip_prefix("normalized")
            .map(|rest| rest.trim_start_matches(':'))
            .ok_or_else(|| ComputerUseError::Config(format!("Unknown coordinate space: {}", s)))?;
        let scale = if scale.is_empty() {
            1000
        } else {
            scale
                .parse()
                .map_err(|_| ComputerUseError::Config(format!("Invalid coordinate scale: {}", scale)))?
        };
        if scale == 0 {
            return Err(ComputerUseError::Config("Coordinate scale must be positive".to_string()));
        }
        Ok(CoordinateSpace::Normalized { scale })
    }
}

impl fmt::Display for CoordinateSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinateSpace::Pixels => write!(f, "pixels"),
            CoordinateSpace::Normalized { scale } => write!(f, "normalized:{}", scale),
        }
    }
}

/// Everything the session needs, built once at startup and passed down explicitly.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub provider: ProviderKind,
    /// Model id or alias requested on the command line
    pub model: Option<String>,
    pub grounding: OsAtlasConfig,
    pub grounding_policy: GroundingPolicy,
    pub coordinates: CoordinateSpace,
    pub timeout: Duration,
}

impl AgentConfig {
    /// Load from environment variables. `provider` and `model` override
    /// `COMPUTER_USE_PROVIDER` and `COMPUTER_USE_MODEL`.
    pub fn from_env(provider: Option<ProviderKind>, model: Option<String>) -> ComputerUseResult<Self> {
        let timeout = match get_env("COMPUTER_USE_TIMEOUT_SECS", false, None)? {
            Some(raw) => Duration::from_secs(raw.trim().parse().map_err(|_| {
                ComputerUseError::Config(format!("Invalid value for COMPUTER_USE_TIMEOUT_SECS: {}", raw))
            })?),
            None => DEFAULT_TIMEOUT,
        };

        let kind = match provider {
            Some(kind) => kind,
            None => get_env("COMPUTER_USE_PROVIDER", false, None)?
                .map(|raw| {
                    ProviderKind::from_str(raw.trim())
                        .map_err(|_| ComputerUseError::Config(format!("Unknown provider: {}", raw)))
                })
                .transpose()?
                .unwrap_or(ProviderKind::OpenAi),
        };

        let grounding_policy = get_env("COMPUTER_USE_GROUNDING_POLICY", false, None)?
            .map(|raw| raw.parse::<GroundingPolicy>())
            .transpose()?
            .unwrap_or_default();
        let coordinates = get_env("COMPUTER_USE_COORDINATES", false, None)?
            .map(|raw| raw.parse::<CoordinateSpace>())
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            provider: kind,
            model,
            grounding: OsAtlasConfig::from_env(timeout)?,
            grounding_policy,
            coordinates,
            timeout,
        })
    }

    /// Credentials and sampling settings for the selected provider, read from
    /// the environment on demand. Missing API keys are reported here.
    pub fn provider_config(&self) -> ComputerUseResult<ProviderConfig> {
        ProviderConfig::from_env(self.provider, self.model.clone(), self.timeout)
    }
}
