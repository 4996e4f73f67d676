//! Configuration for sightline-eye

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Distance calibration and guidance thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuidancePolicy {
    /// Bounding box width (pixels) of a reference object at `known_distance_m`
    pub reference_width_px: f64,
    /// Distance (meters) at which the reference width was measured
    pub known_distance_m: f64,
    /// Fraction of the frame width below which a center is "left"
    pub left_boundary: f64,
    /// Fraction of the frame width above which a center is "right"
    pub right_boundary: f64,
    /// Obstacles at or beyond this distance are ignored
    pub relevance_range_m: f64,
    /// An obstacle ahead closer than this triggers a turn instruction
    pub turn_distance_m: f64,
    /// A side obstacle closer than this triggers a warning
    pub side_warning_m: f64,
}

impl Default for GuidancePolicy {
    fn default() -> Self {
        Self {
            reference_width_px: 100.0,
            known_distance_m: 1.0,
            left_boundary: 0.4,
            right_boundary: 0.6,
            relevance_range_m: 3.0,
            turn_distance_m: 1.5,
            side_warning_m: 1.0,
        }
    }
}

impl GuidancePolicy {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.reference_width_px > 0.0) || !(self.known_distance_m > 0.0) {
            return Err("Distance calibration values must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.left_boundary)
            || !(0.0..=1.0).contains(&self.right_boundary)
            || self.left_boundary > self.right_boundary
        {
            return Err("Direction boundaries must satisfy 0 <= left <= right <= 1".to_string());
        }
        if !(self.relevance_range_m > 0.0) || !(self.turn_distance_m > 0.0) || !(self.side_warning_m > 0.0) {
            return Err("Guidance distances must be positive".to_string());
        }
        Ok(())
    }
}

/// Vision system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// USB camera device index (0, 1, 2, etc.)
    pub camera_id: u32,
    /// Requested camera resolution (width, height)
    pub resolution: (u32, u32),
    /// Detector weights used while navigating (small, fast)
    pub navigation_model: PathBuf,
    /// Detector weights used for object description (larger, slower)
    pub description_model: PathBuf,
    /// Minimum class confidence for the navigation detector
    pub navigation_confidence: f32,
    /// IoU threshold for the navigation detector's non-maximum suppression
    pub navigation_iou: f32,
    /// Minimum class confidence for the description detector
    pub description_confidence: f32,
    /// IoU threshold for the description detector's non-maximum suppression
    pub description_iou: f32,
    /// JPEG quality of streamed frames (1-100)
    pub jpeg_quality: u8,
    /// OCR executable (tesseract compatible command line)
    pub ocr_command: String,
    /// OCR language
    pub ocr_language: String,
    /// Wait for a stopping session to release the camera before a new one opens it
    pub handoff_timeout_ms: u64,
    /// TrueType font for overlay labels; common system fonts are tried when unset
    pub overlay_font: Option<PathBuf>,
    pub guidance: GuidancePolicy,
}

impl Default for VisionConfig {
    fn default() -> Self {
        let model_path = dirs::home_dir()
            .map(|mut p| {
                p.push(".sightline");
                p.push("models");
                p
            })
            .unwrap_or_else(|| PathBuf::from("./models"));

        Self {
            camera_id: 0,
            resolution: (640, 480),
            navigation_model: model_path.join("yolov8n.onnx"),
            description_model: model_path.join("yolov8l.onnx"),
            navigation_confidence: 0.3,
            navigation_iou: 0.2,
            description_confidence: 0.25,
            description_iou: 0.7,
            jpeg_quality: 80,
            ocr_command: "tesseract".to_string(),
            ocr_language: "eng".to_string(),
            handoff_timeout_ms: 2000,
            overlay_font: None,
            guidance: GuidancePolicy::default(),
        }
    }
}

impl VisionConfig {
    pub fn handoff_timeout(&self) -> Duration {
        Duration::from_millis(self.handoff_timeout_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.resolution.0 == 0 || self.resolution.1 == 0 {
            return Err("Resolution must be non-zero".to_string());
        }

        if self.resolution.0 > 7680 || self.resolution.1 > 4320 {
            return Err("Resolution too large (max 8K)".to_string());
        }

        if self.camera_id > 100 {
            return Err("Camera ID too large (max 100)".to_string());
        }

        for (name, value) in [
            ("navigation_confidence", self.navigation_confidence),
            ("navigation_iou", self.navigation_iou),
            ("description_confidence", self.description_confidence),
            ("description_iou", self.description_iou),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{} must be between 0 and 1", name));
            }
        }

        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err("JPEG quality must be between 1 and 100".to_string());
        }

        if self.ocr_command.trim().is_empty() {
            return Err("OCR command cannot be empty".to_string());
        }

        if self.handoff_timeout_ms == 0 {
            return Err("Camera hand-off timeout must be positive".to_string());
        }

        self.guidance.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = VisionConfig::default();
        assert_eq!(config.camera_id, 0);
        assert_eq!(config.resolution, (640, 480));
        assert_eq!(config.navigation_confidence, 0.3);
        assert_eq!(config.navigation_iou, 0.2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_policy_defaults_match_guidance_rules() {
        let policy = GuidancePolicy::default();
        assert_eq!(policy.reference_width_px, 100.0);
        assert_eq!(policy.known_distance_m, 1.0);
        assert_eq!(policy.relevance_range_m, 3.0);
        assert_eq!(policy.turn_distance_m, 1.5);
        assert_eq!(policy.side_warning_m, 1.0);
    }

    #[test]
    fn test_config_validation_resolution_zero() {
        let mut config = VisionConfig::default();
        config.resolution = (0, 480);
        assert!(config.validate().is_err());

        config.resolution = (640, 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_camera_id_too_large() {
        let mut config = VisionConfig::default();
        config.camera_id = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_thresholds() {
        let mut config = VisionConfig::default();
        config.navigation_iou = 1.5;
        assert!(config.validate().is_err());

        let mut config = VisionConfig::default();
        config.jpeg_quality = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_policy_rejects_inverted_boundaries() {
        let policy = GuidancePolicy {
            left_boundary: 0.7,
            right_boundary: 0.3,
            ..GuidancePolicy::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_partial_policy_deserializes_with_defaults() {
        let policy: GuidancePolicy = serde_json::from_str(r#"{"turn_distance_m": 2.0}"#).unwrap();
        assert_eq!(policy.turn_distance_m, 2.0);
        assert_eq!(policy.side_warning_m, 1.0);
    }
}
