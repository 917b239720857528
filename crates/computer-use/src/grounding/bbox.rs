use lazy_static::lazy_static;
use regex::{Captures, Regex};

const NUMBER_PATTERN: &str = r"-?\d+(?:\.\d+)?";

lazy_static! {
    static ref BOX_TAGS: Regex = Regex::new(r"(?s)<\|box_start\|>(.*?)<\|box_end\|>").unwrap();
    static ref NUMBER: Regex = Regex::new(NUMBER_PATTERN).unwrap();
    // (l,t),(r,b)
    static ref CORNER_PAIR: Regex = Regex::new(&format!(
        r"\(\s*({n})\s*,\s*({n})\s*\)\s*,?\s*\(\s*({n})\s*,\s*({n})\s*\)",
        n = NUMBER_PATTERN
    ))
    .unwrap();
    // [l, t, r, b] or (l, t, r, b)
    static ref EDGE_LIST: Regex = Regex::new(&format!(
        r"[(\[]\s*({n})\s*,\s*({n})\s*,\s*({n})\s*,\s*({n})\s*[)\]]",
        n = NUMBER_PATTERN
    ))
    .unwrap();
    static ref POINT: Regex = Regex::new(&format!(r"[(\[]\s*({n})\s*,\s*({n})\s*[)\]]", n = NUMBER_PATTERN)).unwrap();
}

/// A detected region, `(left, top, right, bottom)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl BoundingBox {
    /// Edges are reordered so that left <= right and top <= bottom.
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        BoundingBox {
            left: left.min(right),
            top: top.min(bottom),
            right: left.max(right),
            bottom: top.max(bottom),
        }
    }

    pub fn midpoint(&self) -> (f64, f64) {
        ((self.left + self.right) / 2.0, (self.top + self.bottom) / 2.0)
    }
}

/// What a grounding backend pointed at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Detection {
    Box(BoundingBox),
    Point(f64, f64),
}

impl Detection {
    /// The actuation point: the box midpoint, or the point itself.
    pub fn target(&self) -> (f64, f64) {
        match self {
            Detection::Box(bbox) => bbox.midpoint(),
            Detection::Point(x, y) => (*x, *y),
        }
    }
}

/// Parse a grounding answer such as `<|box_start|>(10,20),(30,40)<|box_end|>`.
///
/// Inside the box tags every number counts: four or more are read as a box,
/// exactly two as a point. Without tags only bracketed literals are accepted,
/// `(l,t),(r,b)`, `[l, t, r, b]` or `(x, y)`, so stray numbers in prose are
/// never mistaken for coordinates.
pub fn parse_detection(text: &str) -> Option<Detection> {
    match BOX_TAGS.captures(text).and_then(|captures| captures.get(1)) {
        Some(inner) => {
            let numbers: Vec<f64> = NUMBER
                .find_iter(inner.as_str())
                .filter_map(|m| m.as_str().parse().ok())
                .collect();
            from_numbers(&numbers)
        }
        None => CORNER_PAIR
            .captures(text)
            .or_else(|| EDGE_LIST.captures(text))
            .or_else(|| POINT.captures(text))
            .and_then(|captures| from_numbers(&captured_numbers(&captures)?)),
    }
}

fn captured_numbers(captures: &Captures) -> Option<Vec<f64>> {
    captures
        .iter()
        .skip(1)
        .map(|m| m?.as_str().parse().ok())
        .collect()
}

fn from_numbers(numbers: &[f64]) -> Option<Detection> {
    match numbers {
        [x, y] => Some(Detection::Point(*x, *y)),
        [left, top, right, bottom, ..] => Some(Detection::Box(BoundingBox::new(*left, *top, *right, *bottom))),
        _ => None,
    }
}
