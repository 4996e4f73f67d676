//! Error types for sightline-eye

use sightline_core::Error as CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Camera error: {0}")]
    Camera(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("OCR error: {0}")]
    Ocr(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("ONNX Runtime error: {0}")]
    Ort(String),

    #[error("OpenCV error: {0}")]
    OpenCv(String),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

impl VisionError {
    /// Whether the error comes from the camera device itself
    pub fn is_device_error(&self) -> bool {
        matches!(self, VisionError::Camera(_) | VisionError::OpenCv(_))
    }
}

impl From<VisionError> for CoreError {
    fn from(err: VisionError) -> Self {
        if err.is_device_error() {
            CoreError::Device(err.to_string())
        } else {
            CoreError::Collaborator(format!("Vision error: {}", err))
        }
    }
}

#[cfg(feature = "opencv")]
impl From<opencv::Error> for VisionError {
    fn from(err: opencv::Error) -> Self {
        VisionError::OpenCv(err.message)
    }
}

#[cfg(feature = "onnx")]
impl From<ort::Error> for VisionError {
    fn from(err: ort::Error) -> Self {
        VisionError::Ort(err.to_string())
    }
}
