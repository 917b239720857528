//! Resolve a natural-language element description to a screen coordinate.
//!
//! A [`GroundingBackend`] answers with free text containing a bounding box; the
//! [`GroundingResolver`] parses it, reduces it to the box midpoint and checks the
//! point against the screenshot it was asked about.
pub mod bbox;
pub mod osatlas;

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use image::ImageReader;

use crate::config::CoordinateSpace;
use crate::errors::{ComputerUseError, ComputerUseResult};
use bbox::parse_detection;

/// Appended to every query so the backend answers with a box.
pub const BBOX_INSTRUCTION: &str = "\nReturn the response in the form of a bbox";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coordinate {
    pub x: i64,
    pub y: i64,
}

/// Raw answer of a grounding backend.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundingResponse {
    pub text: String,
    /// Reference to the annotated image or result the backend produced
    pub image_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroundingResult {
    pub x: i64,
    pub y: i64,
    pub provenance: Option<String>,
}

impl GroundingResult {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate { x: self.x, y: self.y }
    }
}

pub trait GroundingBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Ask the backend where `prompt` points in `screenshot`.
    fn locate(&self, screenshot: &[u8], prompt: &str) -> ComputerUseResult<GroundingResponse>;
}

pub struct GroundingResolver {
    backend: Box<dyn GroundingBackend>,
    coordinates: CoordinateSpace,
}

impl GroundingResolver {
    pub fn new(backend: Box<dyn GroundingBackend>, coordinates: CoordinateSpace) -> Self {
        Self { backend, coordinates }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn resolve(&self, query: &str, screenshot: &[u8]) -> ComputerUseResult<GroundingResult> {
        if query.trim().is_empty() {
            return Err(ComputerUseError::Grounding("empty element query".to_string()));
        }
        let (width, height) = screenshot_dimensions(screenshot)?;

        let prompt = format!("{}{}", query, BBOX_INSTRUCTION);
        let response = self.backend.locate(screenshot, &prompt)?;
        tracing::debug!(
            backend = %self.backend.name(),
            answer = %response.text,
            image = ?response.image_ref,
            "grounding answer"
        );

        let detection = parse_detection(&response.text).ok_or_else(|| {
            ComputerUseError::Grounding(format!("no bounding box in response: {}", response.text))
        })?;

        let (x, y) = detection.target();
        let (x, y) = match self.coordinates {
            CoordinateSpace::Pixels => (x, y),
            CoordinateSpace::Normalized { scale } => (
                x * f64::from(width) / f64::from(scale),
                y * f64::from(height) / f64::from(scale),
            ),
        };
        let (x, y) = (x.floor() as i64, y.floor() as i64);

        if x < 0 || y < 0 || x >= i64::from(width) || y >= i64::from(height) {
            return Err(ComputerUseError::Grounding(format!(
                "({}, {}) lies outside the {}x{} screenshot",
                x, y, width, height
            )));
        }

        Ok(GroundingResult {
            x,
            y,
            provenance: response.image_ref,
        })
    }
}

/// Pixel size of an encoded screenshot, read from its header.
pub fn screenshot_dimensions(screenshot: &[u8]) -> ComputerUseResult<(u32, u32)> {
    ImageReader::new(Cursor::new(screenshot))
        .with_guessed_format()
        .map_err(|e| ComputerUseError::InvalidImage(e.to_string()))?
        .into_dimensions()
        .map_err(|e| ComputerUseError::InvalidImage(e.to_string()))
}

/// Backend answering from a fixed script, for tests and dry runs.
///
/// Clones share the script and the prompt log.
#[derive(Clone)]
pub struct StaticGroundingBackend {
    responses: Arc<Mutex<Vec<ComputerUseResult<GroundingResponse>>>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl StaticGroundingBackend {
    pub fn new(responses: Vec<ComputerUseResult<GroundingResponse>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Backend that always answers with `text`.
    pub fn answering<S: Into<String>>(text: S) -> Self {
        Self::new(vec![Ok(GroundingResponse {
            text: text.into(),
            image_ref: None,
        })])
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl GroundingBackend for StaticGroundingBackend {
    fn name(&self) -> &str {
        "static"
    }

    fn locate(&self, _screenshot: &[u8], prompt: &str) -> ComputerUseResult<GroundingResponse> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        let mut responses = match self.responses.lock() {
            Ok(responses) => responses,
            Err(poisoned) => poisoned.into_inner(),
        };
        // the last scripted answer repeats
        match responses.len() {
            0 => Err(ComputerUseError::Grounding("no scripted response".to_string())),
            1 => responses[0].clone(),
            _ => responses.remove(0),
        }
    }
}
