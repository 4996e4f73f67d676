//! Native platform TTS engine

use crate::engines::TtsEngine;
use crate::error::SpeechError;
use std::process::Command;
use tracing::debug;

#[cfg(target_os = "macos")]
const PROGRAM: &str = "say";

#[cfg(not(target_os = "macos"))]
const PROGRAM: &str = "espeak-ng";

/// Speaks through the platform speech tool (`espeak-ng` on Linux, `say` on macOS)
pub struct NativeTtsEngine {
    available: bool,
    rate: u32,
    volume: f32,
    voice: Option<String>,
}

impl NativeTtsEngine {
    pub fn new(rate: u32, volume: f32, voice: Option<String>) -> Self {
        let available = program_installed();
        Self {
            available,
            rate,
            volume,
            voice: voice.map(|v| sanitize_voice(&v)).filter(|v| !v.is_empty()),
        }
    }

    fn command(&self, text: &str) -> Command {
        let mut cmd = Command::new(PROGRAM);

        #[cfg(target_os = "macos")]
        {
            // say has no volume flag
            cmd.arg("-r").arg(self.rate.min(500).to_string());
            if let Some(ref voice) = self.voice {
                cmd.arg("-v").arg(voice);
            }
        }

        #[cfg(not(target_os = "macos"))]
        {
            // espeak-ng amplitude is 0-200
            let amplitude = ((self.volume * 200.0).round() as u32).min(200);
            cmd.arg("-s").arg(self.rate.to_string());
            cmd.arg("-a").arg(amplitude.to_string());
            if let Some(ref voice) = self.voice {
                cmd.arg("-v").arg(voice);
            }
        }

        cmd.arg("--").arg(text);
        cmd
    }
}

impl TtsEngine for NativeTtsEngine {
    fn render(&mut self, text: &str) -> Result<(), SpeechError> {
        if !self.available {
            return Err(SpeechError::Engine(format!("{} not available", PROGRAM)));
        }

        let sanitized = sanitize_text(text);
        if sanitized.trim().is_empty() {
            return Ok(());
        }

        debug!("Speaking {} chars with {}", sanitized.len(), PROGRAM);
        let output = self
            .command(&sanitized)
            .output()
            .map_err(|e| SpeechError::Engine(format!("Failed to run {}: {}", PROGRAM, e)))?;

        if !output.status.success() {
            return Err(SpeechError::Engine(format!(
                "{} failed: {}",
                PROGRAM,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(())
    }

    fn name(&self) -> &str {
        PROGRAM
    }

    fn is_available(&self) -> bool {
        self.available
    }
}

fn program_installed() -> bool {
    #[cfg(target_os = "macos")]
    {
        Command::new("which").arg(PROGRAM).output().map(|o| o.status.success()).unwrap_or(false)
    }

    #[cfg(not(target_os = "macos"))]
    {
        Command::new(PROGRAM).arg("--version").output().is_ok()
    }
}

/// Strip control characters, keep at most 100k chars
fn sanitize_text(text: &str) -> String {
    text.chars()
        .map(|c| if c == '\n' || c == '\r' || c == '\t' { ' ' } else { c })
        .filter(|c| !c.is_control())
        .take(100_000)
        .collect()
}

fn sanitize_voice(voice: &str) -> String {
    voice
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '-' || *c == '+' || *c == '_')
        .take(256)
        .collect()
}
