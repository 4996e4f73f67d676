//! Speech-to-text collaborator

use crate::error::RecognitionError;
use std::time::Duration;

/// Raw microphone audio captured by [`SpeechRecognizer::listen`]
#[derive(Debug, Clone, Default)]
pub struct AudioSample {
    /// Mono PCM samples
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl AudioSample {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

/// Microphone capture plus transcription.
///
/// All methods block and are called from a blocking task. Implementations
/// must return on their own once `timeout` and `phrase_limit` have passed:
/// a call outliving the pipeline's guard timeout keeps its thread, and the
/// pipeline refuses new commands until it returns.
pub trait SpeechRecognizer: Send + Sync {
    /// Adjust the energy threshold to the ambient noise
    fn calibrate(&self, _duration: Duration) -> Result<(), RecognitionError> {
        Ok(())
    }

    /// Wait up to `timeout` for speech to start and record at most
    /// `phrase_limit` of it
    fn listen(&self, timeout: Duration, phrase_limit: Duration) -> Result<AudioSample, RecognitionError>;

    fn transcribe(&self, audio: &AudioSample) -> Result<String, RecognitionError>;
}

/// Recognizer used when no speech-to-text backend is configured
#[derive(Debug, Default)]
pub struct UnavailableRecognizer;

impl SpeechRecognizer for UnavailableRecognizer {
    fn listen(&self, _timeout: Duration, _phrase_limit: Duration) -> Result<AudioSample, RecognitionError> {
        Err(RecognitionError::Other("No speech recognizer configured".to_string()))
    }

    fn transcribe(&self, _audio: &AudioSample) -> Result<String, RecognitionError> {
        Err(RecognitionError::Other("No speech recognizer configured".to_string()))
    }
}
