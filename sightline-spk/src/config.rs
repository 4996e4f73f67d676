//! Configuration for spoken output

use serde::{Deserialize, Serialize};

/// Which engine renders queued utterances
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Platform speech tool (espeak-ng on Linux, say on macOS)
    Native,
    /// Log utterances instead of playing them
    Silent,
}

/// Speech configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// When false every utterance is only logged
    pub enabled: bool,

    pub engine: EngineKind,

    /// Words per minute
    pub rate: u32,

    /// 0.0 to 1.0
    pub volume: f32,

    /// Engine specific voice name
    pub voice: Option<String>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            engine: EngineKind::Native,
            rate: 180,
            volume: 1.0,
            voice: None,
        }
    }
}

impl SpeechConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.rate == 0 || self.rate > 500 {
            return Err(format!("Speech rate must be between 1 and 500 wpm, got {}", self.rate));
        }

        if !(0.0..=1.0).contains(&self.volume) || self.volume.is_nan() {
            return Err(format!("Volume must be between 0.0 and 1.0, got {}", self.volume));
        }

        if let Some(ref voice) = self.voice {
            if voice.is_empty() || voice.len() > 256 {
                return Err("Voice name must be 1 to 256 characters".to_string());
            }
            if voice.chars().any(|c| c == '\0' || c.is_control()) {
                return Err("Voice name contains invalid characters".to_string());
            }
        }

        Ok(())
    }

    /// Engine that will actually be used
    pub fn effective_engine(&self) -> EngineKind {
        if self.enabled {
            self.engine
        } else {
            EngineKind::Silent
        }
    }
}
