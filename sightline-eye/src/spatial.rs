//! Distance and direction estimation

use crate::config::GuidancePolicy;
use sightline_core::{Detection, Direction, Obstacle};

/// Turns detections into obstacles using a pinhole approximation.
#[derive(Debug, Clone, Default)]
pub struct SpatialAnalyzer {
    policy: GuidancePolicy,
}

impl SpatialAnalyzer {
    pub fn new(policy: GuidancePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &GuidancePolicy {
        &self.policy
    }

    /// `reference_width * known_distance / width`, infinite for non-positive widths
    pub fn estimate_distance(&self, bbox_width_px: f64) -> f64 {
        if bbox_width_px > 0.0 {
            (self.policy.reference_width_px * self.policy.known_distance_m) / bbox_width_px
        } else {
            f64::INFINITY
        }
    }

    /// Boundary values map to `Ahead`
    pub fn classify_direction(&self, center_x: f64, frame_width: f64) -> Direction {
        if center_x < frame_width * self.policy.left_boundary {
            Direction::Left
        } else if center_x > frame_width * self.policy.right_boundary {
            Direction::Right
        } else {
            Direction::Ahead
        }
    }

    /// Obstacle for a single detection, without the relevance filter
    pub fn locate(&self, detection: &Detection, frame_width: u32) -> Obstacle {
        let distance = self.estimate_distance(detection.bbox.width() as f64);
        let direction = self.classify_direction(detection.bbox.center_x(), frame_width as f64);
        Obstacle::new(detection.label.clone(), distance, direction)
    }

    /// Obstacles within the relevance range, in detection order
    pub fn analyze(&self, detections: &[Detection], frame_width: u32) -> Vec<Obstacle> {
        detections
            .iter()
            .map(|d| self.locate(d, frame_width))
            .filter(|o| o.distance_m < self.policy.relevance_range_m)
            .collect()
    }
}
