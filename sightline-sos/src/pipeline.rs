//! Voice command to SOS alert

use crate::config::SosConfig;
use crate::error::RecognitionError;
use crate::geolocation::{Geolocator, Location};
use crate::messaging::Messenger;
use crate::recognizer::SpeechRecognizer;
use crate::similarity::similarity;
use serde::Serialize;
use sightline_spk::SpeechDispatcher;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

pub const PROMPT: &str = "Listening for SOS command";
pub const DETECTED: &str = "SOS detected. Sending alert.";
pub const SENT: &str = "SOS sent to guardian on WhatsApp.";
pub const SEND_FAILED: &str = "Failed to send SOS.";

/// What one SOS invocation ended with
#[derive(Debug, Clone, PartialEq)]
pub enum SosOutcome {
    /// Trigger matched and a location was found. `delivered` tells whether
    /// the messenger accepted the alert.
    AlertSent {
        command: String,
        similarity: f64,
        location: Location,
        delivered: bool,
    },
    /// Trigger matched but the location lookup failed
    LocationUnavailable { command: String, similarity: f64 },
    /// Transcript did not match the trigger phrase
    NoAction { command: String, similarity: f64 },
    /// Listening or transcription failed
    RecognitionFailed(RecognitionError),
}

/// JSON body returned to the client
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct SosResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SosOutcome {
    pub fn command(&self) -> Option<&str> {
        match self {
            SosOutcome::AlertSent { command, .. }
            | SosOutcome::LocationUnavailable { command, .. }
            | SosOutcome::NoAction { command, .. } => Some(command),
            SosOutcome::RecognitionFailed(_) => None,
        }
    }

    pub fn to_response(&self) -> SosResponse {
        let command = self.command().map(str::to_string);
        match self {
            SosOutcome::AlertSent { location, .. } => SosResponse {
                command,
                status: Some("SOS Sent".to_string()),
                location: Some(location.map_link()),
                ..Default::default()
            },
            SosOutcome::LocationUnavailable { .. } => SosResponse {
                command,
                error: Some("Could not retrieve location.".to_string()),
                ..Default::default()
            },
            SosOutcome::NoAction { .. } => SosResponse {
                command,
                status: Some("No action taken".to_string()),
                ..Default::default()
            },
            SosOutcome::RecognitionFailed(e) => SosResponse {
                error: Some(e.to_string()),
                ..Default::default()
            },
        }
    }
}

/// Alert text sent to the guardian
pub fn alert_body(location: &Location) -> String {
    format!(
        "SOS Alert! Emergency help needed.\nLocation: {}\nLive on Map: {}",
        location.city,
        location.map_link()
    )
}

/// Listens for the trigger phrase and raises the alert
pub struct SosPipeline {
    config: SosConfig,
    speech: Arc<SpeechDispatcher>,
    recognizer: Arc<dyn SpeechRecognizer>,
    geolocator: Arc<dyn Geolocator>,
    messenger: Arc<dyn Messenger>,
    /// Set while a recognizer call is running, including one abandoned by
    /// the guard timeout
    listening: Arc<AtomicBool>,
}

/// Clears the listening flag when the blocking recognizer call returns
struct ListeningGuard(Arc<AtomicBool>);

impl Drop for ListeningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SosPipeline {
    pub fn new(
        config: SosConfig,
        speech: Arc<SpeechDispatcher>,
        recognizer: Arc<dyn SpeechRecognizer>,
        geolocator: Arc<dyn Geolocator>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self {
            config,
            speech,
            recognizer,
            geolocator,
            messenger,
            listening: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &SosConfig {
        &self.config
    }

    /// Run one SOS invocation to completion
    pub async fn run(&self) -> SosOutcome {
        self.say(PROMPT);

        let command = match self.capture_command().await {
            Ok(command) => command,
            Err(e) => {
                warn!("SOS voice command failed: {}", e);
                return SosOutcome::RecognitionFailed(e);
            }
        };

        let similarity = similarity(&command, &self.config.trigger_phrase);
        info!("Heard '{}', similarity {:.2}", command, similarity);

        if similarity <= self.config.similarity_threshold {
            return SosOutcome::NoAction { command, similarity };
        }

        self.say(DETECTED);

        let location = match self.geolocator.locate().await {
            Ok(Some(location)) => location,
            Ok(None) => {
                warn!("Location could not be resolved");
                return SosOutcome::LocationUnavailable { command, similarity };
            }
            Err(e) => {
                warn!("Location lookup failed: {}", e);
                return SosOutcome::LocationUnavailable { command, similarity };
            }
        };

        let twilio = &self.config.twilio;
        let delivered = match self
            .messenger
            .send(&twilio.to, &twilio.from, &alert_body(&location))
            .await
        {
            Ok(id) => {
                info!("SOS alert delivered ({})", id);
                self.say(SENT);
                true
            }
            Err(e) => {
                error!("Error sending SOS alert: {}", e);
                self.say(SEND_FAILED);
                false
            }
        };

        SosOutcome::AlertSent {
            command,
            similarity,
            location,
            delivered,
        }
    }

    /// Calibrate, listen and transcribe on a blocking thread, bounded by the
    /// guard timeout. Returns the lowercased transcript.
    ///
    /// A recognizer call abandoned by the guard timeout keeps its thread
    /// until it returns; no new call starts before that.
    async fn capture_command(&self) -> Result<String, RecognitionError> {
        if self.listening.swap(true, Ordering::AcqRel) {
            warn!("Previous recognizer call still running");
            return Err(RecognitionError::Busy);
        }
        let guard = ListeningGuard(self.listening.clone());
        let recognizer = self.recognizer.clone();
        let calibration = self.config.calibration();
        let timeout = self.config.listen_timeout();
        let phrase_limit = self.config.phrase_limit();

        let task = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            recognizer.calibrate(calibration)?;
            let audio = recognizer.listen(timeout, phrase_limit)?;
            recognizer.transcribe(&audio)
        });

        match tokio::time::timeout(self.config.guard_timeout(), task).await {
            Err(_) => {
                warn!("Recognizer did not return within {:?}", self.config.guard_timeout());
                Err(RecognitionError::Timeout)
            }
            Ok(Err(join_error)) => Err(RecognitionError::Other(format!(
                "Recognizer task failed: {}",
                join_error
            ))),
            Ok(Ok(transcript)) => transcript.map(|t| t.trim().to_lowercase()),
        }
    }

    fn say(&self, text: &str) {
        if let Err(e) = self.speech.enqueue(text) {
            warn!("Could not queue '{}': {}", text, e);
        }
    }
}
