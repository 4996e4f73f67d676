//! Custom TTS engine implementation
//! Allows callers to plug in their own rendering function

use crate::engines::TtsEngine;
use crate::error::SpeechError;

/// Custom TTS engine wrapper
pub struct CustomTtsEngine {
    name: String,
    render_fn: Box<dyn FnMut(&str) -> Result<(), SpeechError> + Send>,
}

impl CustomTtsEngine {
    pub fn new<F>(name: impl Into<String>, render_fn: F) -> Self
    where
        F: FnMut(&str) -> Result<(), SpeechError> + Send + 'static,
    {
        Self {
            name: name.into(),
            render_fn: Box::new(render_fn),
        }
    }
}

impl TtsEngine for CustomTtsEngine {
    fn render(&mut self, text: &str) -> Result<(), SpeechError> {
        if text.len() > 100_000 {
            return Err(SpeechError::Engine("Text too long (max 100KB)".to_string()));
        }
        (self.render_fn)(text)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
