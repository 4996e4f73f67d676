//! Detection model backends

pub mod yolo;

pub use yolo::{decode_yolov8, COCO_CLASSES};
#[cfg(feature = "onnx")]
pub use yolo::YoloModel;
