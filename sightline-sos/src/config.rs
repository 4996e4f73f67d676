//! Configuration for the SOS pipeline

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// SOS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SosConfig {
    /// Phrase the transcript is compared against
    pub trigger_phrase: String,

    /// Similarity strictly above this triggers the alert
    pub similarity_threshold: f64,

    /// Wait for speech to start
    pub listen_timeout_secs: u64,

    /// Maximum length of the spoken phrase
    pub phrase_limit_secs: u64,

    /// Ambient noise calibration before listening
    pub calibration_secs: u64,

    /// Extra time allowed for transcription before the listen is abandoned
    pub guard_grace_secs: u64,

    /// IP geolocation endpoint (ipinfo.io JSON format)
    pub geolocation_url: String,

    /// Timeout for outbound HTTP calls
    pub http_timeout_secs: u64,

    pub twilio: TwilioConfig,

    pub recognizer: RecognizerConfig,
}

/// Microphone capture and the web speech API used for transcription
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    /// Input device name (substring match); the default input device when unset
    pub device_name: Option<String>,
    pub language: String,
    /// Google web speech API v2 endpoint
    pub api_url: String,
    /// Read from `SIGHTLINE_SPEECH_API_KEY` when not in the config file
    #[serde(skip_serializing)]
    pub api_key: String,
    /// Starting RMS level above which audio counts as speech
    pub energy_threshold: f64,
    /// Calibrated threshold is the ambient level times this ratio
    pub dynamic_energy_ratio: f64,
    /// Silence that ends a phrase
    pub pause_threshold_ms: u64,
    pub request_timeout_secs: u64,
}

/// Twilio WhatsApp credentials and numbers.
///
/// Credentials come from the config file or `SIGHTLINE_TWILIO_*` variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TwilioConfig {
    pub account_sid: String,
    #[serde(skip_serializing)]
    pub auth_token: String,
    /// Sender, `whatsapp:+...`
    pub from: String,
    /// Guardian, `whatsapp:+...`
    pub to: String,
    pub api_base: String,
}

impl Default for SosConfig {
    fn default() -> Self {
        Self {
            trigger_phrase: "help me".to_string(),
            similarity_threshold: 0.7,
            listen_timeout_secs: 15,
            phrase_limit_secs: 10,
            calibration_secs: 1,
            guard_grace_secs: 10,
            geolocation_url: "https://ipinfo.io/json".to_string(),
            http_timeout_secs: 10,
            twilio: TwilioConfig::default(),
            recognizer: RecognizerConfig::default(),
        }
    }
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            device_name: None,
            language: "en-US".to_string(),
            api_url: "https://www.google.com/speech-api/v2/recognize".to_string(),
            api_key: String::new(),
            energy_threshold: 300.0,
            dynamic_energy_ratio: 1.5,
            pause_threshold_ms: 800,
            request_timeout_secs: 10,
        }
    }
}

impl Default for TwilioConfig {
    fn default() -> Self {
        Self {
            account_sid: String::new(),
            auth_token: String::new(),
            from: "whatsapp:+14155238886".to_string(),
            to: String::new(),
            api_base: "https://api.twilio.com".to_string(),
        }
    }
}

impl SosConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.trigger_phrase.trim().is_empty() {
            return Err("Trigger phrase cannot be empty".to_string());
        }

        if !(self.similarity_threshold > 0.0 && self.similarity_threshold < 1.0) {
            return Err(format!(
                "Similarity threshold must be in (0, 1), got {}",
                self.similarity_threshold
            ));
        }

        if self.listen_timeout_secs == 0 || self.phrase_limit_secs == 0 {
            return Err("Listen timeout and phrase limit must be positive".to_string());
        }

        if self.http_timeout_secs == 0 {
            return Err("HTTP timeout must be positive".to_string());
        }

        self.recognizer.validate()?;

        for (name, url) in [
            ("geolocation_url", &self.geolocation_url),
            ("twilio.api_base", &self.twilio.api_base),
            ("recognizer.api_url", &self.recognizer.api_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(format!("{} must be an http(s) URL", name));
            }
        }

        Ok(())
    }

    pub fn listen_timeout(&self) -> Duration {
        Duration::from_secs(self.listen_timeout_secs)
    }

    pub fn phrase_limit(&self) -> Duration {
        Duration::from_secs(self.phrase_limit_secs)
    }

    pub fn calibration(&self) -> Duration {
        Duration::from_secs(self.calibration_secs)
    }

    /// Upper bound on calibrate + listen + transcribe
    pub fn guard_timeout(&self) -> Duration {
        Duration::from_secs(
            self.calibration_secs
                .saturating_add(self.listen_timeout_secs)
                .saturating_add(self.phrase_limit_secs)
                .saturating_add(self.guard_grace_secs),
        )
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

impl RecognizerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.language.trim().is_empty() {
            return Err("Recognizer language cannot be empty".to_string());
        }
        if !(self.energy_threshold > 0.0) || !(self.dynamic_energy_ratio >= 1.0) {
            return Err("Energy threshold must be positive and the dynamic ratio at least 1".to_string());
        }
        if self.pause_threshold_ms == 0 || self.request_timeout_secs == 0 {
            return Err("Pause threshold and request timeout must be positive".to_string());
        }
        Ok(())
    }

    pub fn pause_threshold(&self) -> Duration {
        Duration::from_millis(self.pause_threshold_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl TwilioConfig {
    pub fn is_configured(&self) -> bool {
        !self.account_sid.is_empty() && !self.auth_token.is_empty() && !self.to.is_empty()
    }
}
