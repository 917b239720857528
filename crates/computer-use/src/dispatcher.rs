use serde_json::Value;

use crate::config::GroundingPolicy;
use crate::effector::{Effector, ScreenshotSource};
use crate::errors::{ComputerUseError, ComputerUseResult};
use crate::events::{EventSink, Tone};
use crate::grounding::{Coordinate, GroundingResolver};
use crate::models::action::Action;
use crate::models::tool::{scalar_to_string, ToolCall};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    Validating,
    Resolving,
    Executing,
    Stopped,
}

/// Parse an operator command of the form `<action> {json}`.
///
/// The JSON part is optional. String values are kept verbatim, numbers and
/// booleans are stringified, anything else is rejected.
pub fn parse_command(raw: &str) -> ComputerUseResult<ToolCall> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ComputerUseError::Parse("empty command".to_string()));
    }

    let (name, rest) = match raw.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (raw, ""),
    };
    let name = name.to_lowercase();
    if rest.is_empty() {
        return Ok(ToolCall::new(name, Default::default()));
    }

    let arguments: Value = serde_json::from_str(rest)
        .map_err(|e| ComputerUseError::Parse(format!("invalid parameters for {}: {}", name, e)))?;
    let object = arguments.as_object().ok_or_else(|| {
        ComputerUseError::Parse(format!("parameters for {} must be a JSON object", name))
    })?;

    let mut parameters = std::collections::BTreeMap::new();
    for (key, value) in object {
        let value = scalar_to_string(value).ok_or_else(|| {
            ComputerUseError::Parse(format!(
                "parameter `{}` must be a string, number or boolean",
                key
            ))
        })?;
        parameters.insert(key.clone(), value);
    }
    Ok(ToolCall::new(name, parameters))
}

/// Validates operator commands, grounds spatial ones and hands them to the effector.
pub struct ActionDispatcher<E, S, L> {
    resolver: GroundingResolver,
    policy: GroundingPolicy,
    effector: E,
    screenshots: S,
    sink: L,
    state: DispatchState,
}

impl<E, S, L> ActionDispatcher<E, S, L>
where
    E: Effector,
    S: ScreenshotSource,
    L: EventSink,
{
    pub fn new(
        resolver: GroundingResolver,
        policy: GroundingPolicy,
        effector: E,
        screenshots: S,
        sink: L,
    ) -> Self {
        Self {
            resolver,
            policy,
            effector,
            screenshots,
            sink,
            state: DispatchState::Idle,
        }
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    pub fn effector(&self) -> &E {
        &self.effector
    }

    pub fn screenshots_mut(&mut self) -> &mut S {
        &mut self.screenshots
    }

    pub fn sink(&self) -> &L {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut L {
        &mut self.sink
    }

    /// Handle one command. Returns false once the session should end.
    ///
    /// Every failure is logged to the sink and the session continues.
    pub fn dispatch(&mut self, raw: &str) -> bool {
        if self.state == DispatchState::Stopped {
            tracing::warn!(command = %raw, "dispatch after stop");
            self.sink
                .log("The session has stopped; command ignored", Tone::Warning);
            return false;
        }

        let keep_going = match self.try_dispatch(raw) {
            Ok(keep_going) => keep_going,
            Err(err) => {
                self.report(&err);
                true
            }
        };
        if self.state != DispatchState::Stopped {
            self.state = DispatchState::Idle;
        }
        keep_going
    }

    /// Like [`dispatch`](Self::dispatch) but returns the failure instead of logging it.
    pub fn try_dispatch(&mut self, raw: &str) -> ComputerUseResult<bool> {
        self.state = DispatchState::Validating;
        let call = parse_command(raw)?;
        let action = Action::from_parameters(&call.name, &call.parameters)?;
        self.sink.log(&call.to_command(), Tone::Info);

        if action == Action::Stop {
            self.state = DispatchState::Stopped;
            self.sink.log("Task completed", Tone::Success);
            return Ok(false);
        }

        let target = match action.query() {
            Some(query) => {
                self.state = DispatchState::Resolving;
                self.ground(query)?
            }
            None => None,
        };

        self.state = DispatchState::Executing;
        let summary = self.effector.execute(&action, target)?;
        self.sink.log(&summary, Tone::Success);
        Ok(true)
    }

    /// Locate `query`, applying the grounding policy. `None` means act at the
    /// current pointer position.
    fn ground(&mut self, query: &str) -> ComputerUseResult<Option<Coordinate>> {
        let attempts = match self.policy {
            GroundingPolicy::Retry { attempts } => attempts.saturating_add(1),
            _ => 1,
        };

        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.locate(query) {
                Ok(coordinate) => return Ok(Some(coordinate)),
                Err(err) => {
                    tracing::debug!(attempt, error = %err, "grounding attempt failed");
                    last_error = Some(err);
                }
            }
        }
        let err = last_error
            .unwrap_or_else(|| ComputerUseError::Grounding(format!("could not locate {}", query)));

        match self.policy {
            GroundingPolicy::Fail => Err(err),
            GroundingPolicy::FallbackToDefault | GroundingPolicy::Retry { .. } => {
                tracing::warn!(query = %query, error = %err, "grounding failed, using the pointer position");
                self.sink.log(
                    &format!("Could not locate \"{}\" ({}); acting at the pointer position", query, err),
                    Tone::Warning,
                );
                Ok(None)
            }
        }
    }

    fn locate(&mut self, query: &str) -> ComputerUseResult<Coordinate> {
        let screenshot = self
            .screenshots
            .capture()
            .map_err(|e| ComputerUseError::Grounding(format!("screenshot failed: {}", e)))?;
        let result = self.resolver.resolve(query, &screenshot)?;
        if let Some(provenance) = &result.provenance {
            self.sink.log(&format!("bbox {}", provenance), Tone::Detail);
        }
        Ok(result.coordinate())
    }

    fn report(&mut self, err: &ComputerUseError) {
        tracing::warn!(stage = err.stage(), error = %err, "command failed");
        self.sink
            .log(&format!("{} failed: {}", err.stage(), err), Tone::Error);
    }
}
