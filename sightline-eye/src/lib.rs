//! sightline-eye: vision side of the assistant
//!
//! Owns the camera device, runs the pluggable object detector, turns
//! detections into spatially tagged obstacles and spoken guidance, and
//! draws the overlays streamed to the client.

pub mod camera;
pub mod config;
pub mod detection;
pub mod error;
pub mod frame;
pub mod guidance;
pub mod models;
pub mod ocr;
pub mod overlay;
pub mod spatial;

pub use camera::{CameraManager, CameraSession, FrameCapture, FrameSource, UnavailableSource};
pub use config::{GuidancePolicy, VisionConfig};
pub use detection::{DetectionPipeline, Detector, DetectorSet, NullDetector};
pub use error::VisionError;
pub use frame::Frame;
pub use guidance::GuidanceGenerator;
pub use ocr::{TesseractCli, TextRecognizer};
pub use overlay::{load_label_font, ModeOverlays, Overlay};
pub use spatial::SpatialAnalyzer;
