use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Device error: {0}")]
    Device(String),

    #[error("Collaborator error: {0}")]
    Collaborator(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Concurrency error: {0}")]
    Concurrency(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, Error>;
