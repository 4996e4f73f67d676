//! Error types for sightline-sos

use sightline_core::Error as CoreError;
use thiserror::Error;

/// Failures of the listen and transcribe steps
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecognitionError {
    #[error("Listening timeout exceeded. No speech detected.")]
    Timeout,

    #[error("Could not understand audio")]
    Unintelligible,

    /// A previous listen has not returned yet
    #[error("Still listening for the previous command")]
    Busy,

    #[error("{0}")]
    Other(String),
}

/// SOS pipeline errors
#[derive(Error, Debug)]
pub enum SosError {
    #[error("Recognition error: {0}")]
    Recognition(#[from] RecognitionError),

    #[error("Geolocation error: {0}")]
    Geolocation(String),

    #[error("Messaging error: {0}")]
    Messaging(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

impl From<SosError> for CoreError {
    fn from(err: SosError) -> Self {
        match err {
            SosError::Config(msg) => CoreError::Configuration(msg),
            other => CoreError::Collaborator(format!("SOS error: {}", other)),
        }
    }
}
