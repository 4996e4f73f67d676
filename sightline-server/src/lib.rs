//! sightline-server: command surface of the assistant
//!
//! Wires the camera, detectors, speech queue and SOS pipeline into one
//! [`assistant::Assistant`], arbitrates the camera between the two streaming
//! modes, and exposes everything over HTTP with Server-Sent Events for the
//! live frames.

pub mod assistant;
pub mod config;
pub mod http;
pub mod modes;
pub mod publisher;

pub use assistant::{Assistant, AssistantParts};
pub use config::{ServerConfig, SightlineConfig, StreamConfig};
pub use modes::{ModeController, ModeState, SessionToken, StartOutcome, StopOutcome};
pub use publisher::{StreamEvent, StreamPublisher};
