//! In-memory camera frame

use crate::error::VisionError;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{GrayImage, RgbImage};

/// A single RGB frame captured from the camera
#[derive(Debug, Clone)]
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    /// Build a frame from packed RGB bytes
    pub fn from_rgb_bytes(width: u32, height: u32, data: Vec<u8>) -> Result<Self, VisionError> {
        let expected = (width as usize) * (height as usize) * 3;
        if data.len() != expected {
            return Err(VisionError::Processing(format!(
                "Frame buffer has {} bytes, expected {} for {}x{}",
                data.len(),
                expected,
                width,
                height
            )));
        }
        RgbImage::from_raw(width, height, data)
            .map(Self::new)
            .ok_or_else(|| VisionError::Processing("Failed to create frame buffer".to_string()))
    }

    /// Solid color frame, mostly useful for tests and placeholders
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        Self::new(RgbImage::from_pixel(width, height, image::Rgb(rgb)))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut RgbImage {
        &mut self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    /// Grayscale copy of the frame (OCR input)
    pub fn to_gray(&self) -> GrayImage {
        image::imageops::grayscale(&self.image)
    }

    /// Encode the frame as JPEG
    pub fn encode_jpeg(&self, quality: u8) -> Result<Bytes, VisionError> {
        let mut buffer = Vec::with_capacity((self.width() * self.height()) as usize / 4);
        let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
        encoder.encode_image(&self.image)?;
        Ok(Bytes::from(buffer))
    }
}
