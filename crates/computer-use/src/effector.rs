use crate::errors::ComputerUseResult;
use crate::grounding::Coordinate;
use crate::models::action::Action;

/// Performs actions against the operating system.
pub trait Effector {
    /// Carry out `action`. Spatial actions receive the grounded `target`, or
    /// `None` to act wherever the pointer currently is. Returns a short summary
    /// of what happened.
    fn execute(&mut self, action: &Action, target: Option<Coordinate>) -> ComputerUseResult<String>;
}

/// Provides the current screen contents as encoded image bytes.
pub trait ScreenshotSource {
    fn capture(&mut self) -> ComputerUseResult<Vec<u8>>;
}
