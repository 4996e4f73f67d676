// Aggregated service configuration

use serde::{Deserialize, Serialize};
use sightline_core::{load_document, ConfigError};
use sightline_eye::VisionConfig;
use sightline_sos::SosConfig;
use sightline_spk::SpeechConfig;
use std::time::Duration;

/// Everything the server needs, one section per crate
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SightlineConfig {
    pub server: ServerConfig,
    pub stream: StreamConfig,
    pub vision: VisionConfig,
    pub speech: SpeechConfig,
    pub sos: SosConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Default tracing filter, overridden by `RUST_LOG`
    pub log_level: String,
}

/// Streaming session pacing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Minimum time between two spoken updates of one session
    pub speech_interval_ms: u64,
    /// Pause after each published frame
    pub frame_delay_ms: u64,
    /// Events buffered per subscriber before it starts lagging
    pub channel_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            log_level: "info".to_string(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            speech_interval_ms: 3000,
            frame_delay_ms: 50,
            channel_capacity: 16,
        }
    }
}

impl StreamConfig {
    pub fn speech_interval(&self) -> Duration {
        Duration::from_millis(self.speech_interval_ms)
    }

    pub fn frame_delay(&self) -> Duration {
        Duration::from_millis(self.frame_delay_ms)
    }
}

impl SightlineConfig {
    /// Load from a TOML, YAML or JSON file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        if path.contains('\0') {
            return Err(ConfigError::IoError("Invalid config path".to_string()));
        }
        let config: Self = load_document(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with `SIGHTLINE_*` environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Overlay `SIGHTLINE_*` environment variables onto this config
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(host) = var("SIGHTLINE_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("SIGHTLINE_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(level) = var("SIGHTLINE_LOG_LEVEL") {
            self.server.log_level = level;
        }
        if let Some(id) = var("SIGHTLINE_CAMERA_ID").and_then(|v| v.parse().ok()) {
            self.vision.camera_id = id;
        }
        if let Some(path) = var("SIGHTLINE_NAVIGATION_MODEL") {
            self.vision.navigation_model = path.into();
        }
        if let Some(path) = var("SIGHTLINE_DESCRIPTION_MODEL") {
            self.vision.description_model = path.into();
        }
        if let Some(enabled) = var("SIGHTLINE_SPEECH_ENABLED").and_then(|v| v.parse().ok()) {
            self.speech.enabled = enabled;
        }
        if let Some(sid) = var("SIGHTLINE_TWILIO_ACCOUNT_SID") {
            self.sos.twilio.account_sid = sid;
        }
        if let Some(token) = var("SIGHTLINE_TWILIO_AUTH_TOKEN") {
            self.sos.twilio.auth_token = token;
        }
        if let Some(from) = var("SIGHTLINE_TWILIO_FROM") {
            self.sos.twilio.from = from;
        }
        if let Some(to) = var("SIGHTLINE_GUARDIAN_NUMBER") {
            self.sos.twilio.to = to;
        }
        if let Some(key) = var("SIGHTLINE_SPEECH_API_KEY") {
            self.sos.recognizer.api_key = key;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.is_empty() {
            return Err(ConfigError::ValidationError("server.host cannot be empty".to_string()));
        }
        if self.stream.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "stream.channel_capacity must be > 0".to_string(),
            ));
        }
        self.vision
            .validate()
            .map_err(|e| ConfigError::ValidationError(format!("vision: {}", e)))?;
        self.speech
            .validate()
            .map_err(|e| ConfigError::ValidationError(format!("speech: {}", e)))?;
        self.sos
            .validate()
            .map_err(|e| ConfigError::ValidationError(format!("sos: {}", e)))?;
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
