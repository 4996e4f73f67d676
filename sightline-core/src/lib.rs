pub mod types;
pub mod error;
pub mod config;

pub use error::{Error, Result};
pub use types::{BoundingBox, Detection, Direction, Mode, Obstacle};
pub use config::{ConfigError, load_document, parse_document};
