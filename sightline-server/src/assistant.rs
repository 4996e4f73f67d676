// Service container wiring every collaborator of the assistant

use crate::config::SightlineConfig;
use crate::modes::{ModeController, ModeState, StartOutcome, StopOutcome};
use crate::publisher::{StreamEvent, StreamPublisher};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use sightline_core::{Error, Mode, Result};
use sightline_eye::{
    CameraManager, DetectorSet, GuidanceGenerator, ModeOverlays, SpatialAnalyzer, TesseractCli, TextRecognizer,
};
use sightline_sos::{
    Geolocator, IpGeolocator, Messenger, SosOutcome, SosPipeline, SpeechRecognizer, TwilioMessenger,
    UnavailableRecognizer,
};
use sightline_spk::SpeechDispatcher;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Result of reading text from the current camera frame
#[derive(Debug, Clone, PartialEq)]
pub enum TextReading {
    /// `result` is the user-facing sentence, `image` the base64 JPEG frame
    Read { result: String, image: String },
    CaptureFailed,
}

/// Explicitly constructed collaborators, injected into [`Assistant::new`]
pub struct AssistantParts {
    pub config: SightlineConfig,
    pub camera: Arc<CameraManager>,
    pub detectors: DetectorSet,
    pub ocr: Arc<dyn TextRecognizer>,
    pub speech: Arc<SpeechDispatcher>,
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub geolocator: Arc<dyn Geolocator>,
    pub messenger: Arc<dyn Messenger>,
}

/// The running assistant: modes, streams, speech, OCR and SOS
pub struct Assistant {
    config: SightlineConfig,
    camera: Arc<CameraManager>,
    ocr: Arc<dyn TextRecognizer>,
    speech: Arc<SpeechDispatcher>,
    modes: Arc<ModeController>,
    publisher: StreamPublisher,
    sos: Arc<SosPipeline>,
}

impl Assistant {
    pub fn new(parts: AssistantParts) -> Self {
        let AssistantParts {
            config,
            camera,
            detectors,
            ocr,
            speech,
            recognizer,
            geolocator,
            messenger,
        } = parts;

        let modes = Arc::new(ModeController::new());
        let policy = config.vision.guidance.clone();
        let publisher = StreamPublisher::new(
            camera.clone(),
            detectors,
            SpatialAnalyzer::new(policy.clone()),
            GuidanceGenerator::new(policy),
            ModeOverlays::from_config(&config.vision),
            speech.clone(),
            modes.clone(),
            config.stream.clone(),
            config.vision.jpeg_quality,
        );
        let sos = Arc::new(SosPipeline::new(
            config.sos.clone(),
            speech.clone(),
            recognizer,
            geolocator,
            messenger,
        ));

        Self {
            config,
            camera,
            ocr,
            speech,
            modes,
            publisher,
            sos,
        }
    }

    /// Build the production collaborators described by `config`
    pub fn from_config(config: SightlineConfig) -> Result<Self> {
        config.validate()?;

        info!("Initializing camera {}", config.vision.camera_id);
        let camera = Arc::new(CameraManager::from_config(&config.vision));

        info!("Loading detectors");
        let detectors = DetectorSet::from_config(&config.vision);

        let ocr: Arc<dyn TextRecognizer> = Arc::new(TesseractCli::new(
            config.vision.ocr_command.clone(),
            config.vision.ocr_language.clone(),
        ));

        let speech = Arc::new(SpeechDispatcher::from_config(&config.speech)?);

        if !config.sos.twilio.is_configured() {
            warn!("Twilio credentials or guardian number missing, SOS alerts cannot be delivered");
        }
        let http_timeout = config.sos.http_timeout();
        let geolocator: Arc<dyn Geolocator> =
            Arc::new(IpGeolocator::new(config.sos.geolocation_url.clone(), http_timeout)?);
        let messenger: Arc<dyn Messenger> = Arc::new(TwilioMessenger::new(&config.sos.twilio, http_timeout)?);
        let recognizer = recognizer_from_config(&config);

        Ok(Self::new(AssistantParts {
            config,
            camera,
            detectors,
            ocr,
            speech,
            recognizer,
            geolocator,
            messenger,
        }))
    }

    pub fn config(&self) -> &SightlineConfig {
        &self.config
    }

    /// Start `mode` and its streaming session
    pub fn start_mode(&self, mode: Mode) -> StartOutcome {
        let outcome = self.modes.start(mode);
        if let StartOutcome::Started(ref token) = outcome {
            self.publisher.launch(token.clone());
        }
        outcome
    }

    pub fn stop_mode(&self, mode: Mode) -> StopOutcome {
        self.modes.stop(mode)
    }

    pub fn mode_state(&self) -> ModeState {
        self.modes.state()
    }

    pub fn is_active(&self, mode: Mode) -> bool {
        self.modes.is_active(mode)
    }

    pub fn subscribe(&self, mode: Mode) -> broadcast::Receiver<StreamEvent> {
        self.publisher.subscribe(mode)
    }

    /// Queue `text` for speaking
    pub fn speak(&self, text: &str) -> Result<()> {
        self.speech.enqueue(text).map_err(Error::from)
    }

    /// Grab one frame and read the printed text in it
    pub async fn read_text(&self) -> Result<TextReading> {
        let camera = self.camera.clone();
        let ocr = self.ocr.clone();
        let quality = self.config.vision.jpeg_quality;

        let reading = tokio::task::spawn_blocking(move || -> Result<Option<_>> {
            let frame = match camera.capture_single() {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Text detection capture failed: {}", e);
                    return Ok(None);
                }
            };
            let text = ocr.recognize_text(&frame.to_gray());
            let jpeg = frame.encode_jpeg(quality)?;
            Ok(Some((text, BASE64.encode(&jpeg))))
        })
        .await
        .map_err(|e| Error::Concurrency(format!("Text detection task failed: {}", e)))??;

        let Some((text, image)) = reading else {
            return Ok(TextReading::CaptureFailed);
        };

        let result = match text {
            Ok(text) => {
                let cleaned = text.trim();
                if cleaned.is_empty() {
                    "No readable text found in the frame.".to_string()
                } else {
                    if let Err(e) = self.speak(cleaned) {
                        warn!("Could not queue detected text: {}", e);
                    }
                    format!("Detected Text: {}", cleaned)
                }
            }
            Err(e) => format!("OCR Error: {}", e),
        };

        Ok(TextReading::Read { result, image })
    }

    /// Run one SOS voice command on its own task
    pub async fn voice_sos(&self) -> Result<SosOutcome> {
        let sos = self.sos.clone();
        tokio::spawn(async move { sos.run().await })
            .await
            .map_err(|e| Error::Concurrency(format!("SOS task failed: {}", e)))
    }

    /// Open and release the camera
    pub async fn test_camera(&self) -> Result<()> {
        let camera = self.camera.clone();
        tokio::task::spawn_blocking(move || camera.health_check())
            .await
            .map_err(|e| Error::Concurrency(format!("Camera check task failed: {}", e)))?
            .map_err(Error::from)
    }

    /// Stop both modes, wait for their sessions and drain the speech queue
    pub async fn shutdown(&self) {
        info!("Stopping assistant");
        self.modes.stop_all();
        self.publisher.wait_idle(Duration::from_secs(5)).await;
        let speech = self.speech.clone();
        if tokio::task::spawn_blocking(move || speech.shutdown()).await.is_err() {
            warn!("Speech worker did not shut down cleanly");
        }
        info!("Assistant stopped");
    }
}

#[cfg(feature = "stt")]
fn recognizer_from_config(config: &SightlineConfig) -> Arc<dyn SpeechRecognizer> {
    match sightline_sos::MicrophoneRecognizer::new(config.sos.recognizer.clone()) {
        Ok(recognizer) => Arc::new(recognizer),
        Err(e) => {
            warn!("Speech recognition unavailable, voice SOS will report an error: {}", e);
            Arc::new(UnavailableRecognizer)
        }
    }
}

#[cfg(not(feature = "stt"))]
fn recognizer_from_config(_config: &SightlineConfig) -> Arc<dyn SpeechRecognizer> {
    warn!("No speech recognizer compiled in (enable the `stt` feature), voice SOS will report an error");
    Arc::new(UnavailableRecognizer)
}
