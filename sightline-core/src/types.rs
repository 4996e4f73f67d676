use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Axis-aligned box in pixel space, `(x1, y1)` top-left and `(x2, y2)` bottom-right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> i32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> i32 {
        self.y2.saturating_sub(self.y1)
    }

    pub fn center_x(&self) -> f64 {
        (self.x1 as f64 + self.x2 as f64) / 2.0
    }
}

/// One recognized object in one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(label: impl Into<String>, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            bbox,
        }
    }
}

/// Horizontal bucket of an obstacle relative to the camera axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Ahead,
    Right,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Left => "left",
            Direction::Ahead => "ahead",
            Direction::Right => "right",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detection enriched with an estimated distance and direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub name: String,
    pub distance_m: f64,
    pub direction: Direction,
}

impl Obstacle {
    pub fn new(name: impl Into<String>, distance_m: f64, direction: Direction) -> Self {
        Self {
            name: name.into(),
            distance_m,
            direction,
        }
    }
}

/// Camera-consuming operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Navigation,
    ObjectDetection,
}

impl Mode {
    pub const ALL: [Mode; 2] = [Mode::Navigation, Mode::ObjectDetection];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Navigation => "navigation",
            Mode::ObjectDetection => "object_detection",
        }
    }

    /// Human readable name used in status messages
    pub fn display_name(&self) -> &'static str {
        match self {
            Mode::Navigation => "Navigation",
            Mode::ObjectDetection => "Object detection",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "navigation" => Ok(Mode::Navigation),
            "object_detection" => Ok(Mode::ObjectDetection),
            other => Err(Error::InvalidInput(format!("Unknown mode '{}'", other))),
        }
    }
}
