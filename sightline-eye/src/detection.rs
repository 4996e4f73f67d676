//! Object detection adapter

use crate::config::VisionConfig;
use crate::error::VisionError;
use crate::frame::Frame;
use sightline_core::{Detection, Mode};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A pluggable object detector producing labelled boxes in frame pixel space
pub trait Detector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, VisionError>;

    fn name(&self) -> &str;
}

/// Detector that never sees anything
pub struct NullDetector;

impl Detector for NullDetector {
    fn detect(&self, _frame: &Frame) -> Result<Vec<Detection>, VisionError> {
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "null"
    }
}

/// Object detection pipeline
pub struct DetectionPipeline {
    detector: Arc<dyn Detector>,
}

impl DetectionPipeline {
    pub fn new(detector: Arc<dyn Detector>) -> Self {
        Self { detector }
    }

    /// Process frame and detect objects.
    ///
    /// Boxes are normalized so that `x1 <= x2` and `y1 <= y2`; boxes with no
    /// label are dropped.
    pub fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, VisionError> {
        debug!("Running object detection with {}", self.detector.name());
        let detections = self.detector.detect(frame)?;
        let detections: Vec<Detection> = detections
            .into_iter()
            .filter(|d| !d.label.trim().is_empty())
            .map(|mut d| {
                if d.bbox.x1 > d.bbox.x2 {
                    std::mem::swap(&mut d.bbox.x1, &mut d.bbox.x2);
                }
                if d.bbox.y1 > d.bbox.y2 {
                    std::mem::swap(&mut d.bbox.y1, &mut d.bbox.y2);
                }
                d
            })
            .collect();
        debug!("Detected {} objects", detections.len());
        Ok(detections)
    }

    pub fn detector_name(&self) -> &str {
        self.detector.name()
    }
}

/// One detection pipeline per mode
#[derive(Clone)]
pub struct DetectorSet {
    navigation: Arc<DetectionPipeline>,
    description: Arc<DetectionPipeline>,
}

impl DetectorSet {
    pub fn new(navigation: Arc<dyn Detector>, description: Arc<dyn Detector>) -> Self {
        Self {
            navigation: Arc::new(DetectionPipeline::new(navigation)),
            description: Arc::new(DetectionPipeline::new(description)),
        }
    }

    /// Same detector for both modes
    pub fn shared(detector: Arc<dyn Detector>) -> Self {
        Self::new(detector.clone(), detector)
    }

    pub fn for_mode(&self, mode: Mode) -> &Arc<DetectionPipeline> {
        match mode {
            Mode::Navigation => &self.navigation,
            Mode::ObjectDetection => &self.description,
        }
    }

    /// Load the detectors named in the config.
    ///
    /// A model that cannot be loaded is replaced by [`NullDetector`] so the
    /// stream still runs; the failure is logged.
    pub fn from_config(config: &VisionConfig) -> Self {
        let navigation = load_detector(
            &config.navigation_model,
            config.navigation_confidence,
            config.navigation_iou,
        );
        let description = load_detector(
            &config.description_model,
            config.description_confidence,
            config.description_iou,
        );
        Self::new(navigation, description)
    }
}

#[cfg(feature = "onnx")]
fn load_detector(path: &std::path::Path, confidence: f32, iou: f32) -> Arc<dyn Detector> {
    match crate::models::YoloModel::new(path, confidence, iou) {
        Ok(model) => {
            info!("YOLO detector loaded from {:?}", path);
            Arc::new(model)
        }
        Err(e) => {
            warn!("Failed to load detector {:?}: {}, detection disabled", path, e);
            Arc::new(NullDetector)
        }
    }
}

#[cfg(not(feature = "onnx"))]
fn load_detector(path: &std::path::Path, _confidence: f32, _iou: f32) -> Arc<dyn Detector> {
    warn!(
        "Detector {:?} not loaded: built without the `onnx` feature, detection disabled",
        path
    );
    info!("Using null detector");
    Arc::new(NullDetector)
}
