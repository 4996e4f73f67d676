//! Optical character recognition collaborator

use crate::error::VisionError;
use image::GrayImage;
use std::process::Command;
use tempfile::NamedTempFile;
use tracing::debug;

/// Reads printed text from a grayscale frame
pub trait TextRecognizer: Send + Sync {
    /// Recognized text; empty when nothing readable was found
    fn recognize_text(&self, image: &GrayImage) -> Result<String, VisionError>;
}

/// Tesseract command line OCR
pub struct TesseractCli {
    command: String,
    language: String,
}

impl TesseractCli {
    pub fn new(command: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            language: language.into(),
        }
    }
}

impl TextRecognizer for TesseractCli {
    fn recognize_text(&self, image: &GrayImage) -> Result<String, VisionError> {
        let temp_file = tempfile::Builder::new()
            .prefix("sightline-ocr-")
            .suffix(".png")
            .tempfile()
            .map_err(VisionError::Io)?;
        write_png(image, &temp_file)?;

        // Language codes are short alphanumeric identifiers joined with '+'
        let language: String = self
            .language
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '+' || *c == '_')
            .take(64)
            .collect();

        let mut cmd = Command::new(&self.command);
        cmd.arg(temp_file.path()).arg("stdout");
        if !language.is_empty() {
            cmd.arg("-l").arg(&language);
        }

        debug!("Running OCR with {}", self.command);
        let output = cmd
            .output()
            .map_err(|e| VisionError::Ocr(format!("Failed to execute {}: {}", self.command, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VisionError::Ocr(format!("{} failed: {}", self.command, stderr.trim())));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn write_png(image: &GrayImage, file: &NamedTempFile) -> Result<(), VisionError> {
    image.save_with_format(file.path(), image::ImageFormat::Png)?;
    Ok(())
}
