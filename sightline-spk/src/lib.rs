//! sightline-spk: spoken output for the assistant
//!
//! Every utterance goes through one [`SpeechDispatcher`], a single worker
//! thread draining an unbounded FIFO queue, so utterances never overlap
//! and are heard in the order they were requested.

pub mod config;
pub mod dispatcher;
pub mod engines;
pub mod error;

pub use config::{EngineKind, SpeechConfig};
pub use dispatcher::{SpeechCommand, SpeechDispatcher, SpeechRequest};
pub use engines::{CustomTtsEngine, NativeTtsEngine, SilentEngine, TtsEngine};
pub use error::SpeechError;
