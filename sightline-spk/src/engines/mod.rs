//! TTS engine implementations

pub mod custom;
pub mod native;

pub use custom::CustomTtsEngine;
pub use native::NativeTtsEngine;

use crate::config::{EngineKind, SpeechConfig};
use crate::error::SpeechError;
use tracing::{info, warn};

/// Renders one utterance to the audio device.
///
/// `render` blocks until playback has finished. Engines are owned by the
/// speech worker thread and never shared.
pub trait TtsEngine: Send {
    fn render(&mut self, text: &str) -> Result<(), SpeechError>;

    fn name(&self) -> &str;

    fn is_available(&self) -> bool {
        true
    }
}

/// Engine that only logs what would have been said
#[derive(Debug, Default)]
pub struct SilentEngine;

impl TtsEngine for SilentEngine {
    fn render(&mut self, text: &str) -> Result<(), SpeechError> {
        info!("(silent) {}", text);
        Ok(())
    }

    fn name(&self) -> &str {
        "silent"
    }
}

/// Build the engine selected by the config, falling back to [`SilentEngine`]
/// when the native tool is missing
pub fn engine_from_config(config: &SpeechConfig) -> Box<dyn TtsEngine> {
    match config.effective_engine() {
        EngineKind::Silent => Box::new(SilentEngine),
        EngineKind::Native => {
            let engine = NativeTtsEngine::new(config.rate, config.volume, config.voice.clone());
            if engine.is_available() {
                info!("Native TTS engine initialized ({})", engine.name());
                Box::new(engine)
            } else {
                warn!("Native TTS not available on this system, speech will only be logged");
                Box::new(SilentEngine)
            }
        }
    }
}
