//! Error types for sightline-spk

use sightline_core::Error as CoreError;
use thiserror::Error;

/// Speech synthesis errors
#[derive(Error, Debug)]
pub enum SpeechError {
    #[error("Dispatcher error: {0}")]
    Dispatcher(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

impl From<SpeechError> for CoreError {
    fn from(err: SpeechError) -> Self {
        match err {
            SpeechError::Dispatcher(msg) => CoreError::Concurrency(format!("Speech dispatcher: {}", msg)),
            SpeechError::Config(msg) => CoreError::Configuration(msg),
            other => CoreError::Collaborator(format!("Speech error: {}", other)),
        }
    }
}
