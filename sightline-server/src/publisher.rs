//! Per-mode streaming sessions
//!
//! A started mode runs one session loop on a blocking thread. Each iteration
//! holds the camera for one capture cycle (read, detect, annotate), speaks at
//! most once per speech interval, then publishes the frame on the mode's
//! broadcast channel.

use crate::config::StreamConfig;
use crate::modes::{ModeController, SessionToken};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use parking_lot::Mutex;
use serde::Serialize;
use sightline_core::{Mode, Obstacle};
use sightline_eye::{CameraManager, DetectorSet, Frame, GuidanceGenerator, ModeOverlays, SpatialAnalyzer};
use sightline_spk::SpeechDispatcher;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Pushed to every subscriber of a mode
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Frame {
        /// Annotated frame, base64 JPEG
        image: String,
        /// Text queued for speaking with this frame
        #[serde(skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
        detections: Vec<Obstacle>,
    },
    Error {
        message: String,
        /// The session ended because of this error
        fatal: bool,
    },
    Stopped,
}

/// Spoken updates at most once per interval; the first one is immediate
#[derive(Debug)]
struct SpeechThrottle {
    interval: Duration,
    last_spoken: Option<Instant>,
}

impl SpeechThrottle {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_spoken: None,
        }
    }

    fn ready(&mut self, now: Instant) -> bool {
        let ready = match self.last_spoken {
            None => true,
            Some(last) => now.duration_since(last) > self.interval,
        };
        if ready {
            self.last_spoken = Some(now);
        }
        ready
    }
}

/// Collaborators shared by every session
struct SessionContext {
    camera: Arc<CameraManager>,
    detectors: DetectorSet,
    analyzer: SpatialAnalyzer,
    generator: GuidanceGenerator,
    overlays: ModeOverlays,
    speech: Arc<SpeechDispatcher>,
    modes: Arc<ModeController>,
    settings: StreamConfig,
    jpeg_quality: u8,
    navigation_tx: broadcast::Sender<StreamEvent>,
    description_tx: broadcast::Sender<StreamEvent>,
}

impl SessionContext {
    fn channel(&self, mode: Mode) -> &broadcast::Sender<StreamEvent> {
        match mode {
            Mode::Navigation => &self.navigation_tx,
            Mode::ObjectDetection => &self.description_tx,
        }
    }

    fn publish(&self, mode: Mode, event: StreamEvent) {
        // No subscribers is fine; frames are only for whoever is watching
        if self.channel(mode).send(event).is_err() {
            debug!("No {} subscribers", mode);
        }
    }

    fn run(&self, token: SessionToken) {
        let mode = token.mode();

        let mut session = match self.camera.open_session() {
            Ok(session) => session,
            Err(e) => {
                error!("Could not open camera for {}: {}", mode, e);
                self.publish(
                    mode,
                    StreamEvent::Error {
                        message: format!("Could not open webcam: {}", e),
                        fatal: true,
                    },
                );
                self.modes.finish(&token);
                self.publish(mode, StreamEvent::Stopped);
                return;
            }
        };

        let mut throttle = SpeechThrottle::new(self.settings.speech_interval());
        let mut frames = 0u64;

        while token.is_active() {
            match session.cycle(|frame| self.process(mode, frame, &mut throttle)) {
                Ok(event) => {
                    frames += 1;
                    self.publish(mode, event);
                }
                Err(e) => {
                    error!("{} session lost the camera: {}", mode.display_name(), e);
                    self.publish(
                        mode,
                        StreamEvent::Error {
                            message: format!("Failed to read frame: {}", e),
                            fatal: true,
                        },
                    );
                    break;
                }
            }
            thread::sleep(self.settings.frame_delay());
        }

        session.release();
        self.modes.finish(&token);
        info!("{} session ended after {} frames", mode.display_name(), frames);
        self.publish(mode, StreamEvent::Stopped);
    }

    /// Detect, annotate, maybe speak, encode. Runs under the device lock.
    fn process(&self, mode: Mode, mut frame: Frame, throttle: &mut SpeechThrottle) -> StreamEvent {
        let detections = match self.detectors.for_mode(mode).detect(&frame) {
            Ok(detections) => detections,
            Err(e) => {
                warn!("Detection failed: {}", e);
                return StreamEvent::Error {
                    message: format!("Detection failed: {}", e),
                    fatal: false,
                };
            }
        };

        let width = frame.width();
        let located: Vec<Obstacle> = detections.iter().map(|d| self.analyzer.locate(d, width)).collect();

        let labelled: Vec<_> = detections
            .iter()
            .zip(&located)
            .map(|(d, o)| (d, format!("{} {:.1}m", o.name, o.distance_m)))
            .collect();
        self.overlays.for_mode(mode).annotate(&mut frame, &labelled);

        let caption = if throttle.ready(Instant::now()) {
            let text = match mode {
                Mode::Navigation => self
                    .generator
                    .generate_instruction(&self.analyzer.analyze(&detections, width)),
                Mode::ObjectDetection => self.generator.describe_objects(&located),
            };
            if let Err(e) = self.speech.enqueue(text.clone()) {
                warn!("Could not queue guidance: {}", e);
            }
            Some(text)
        } else {
            None
        };

        match frame.encode_jpeg(self.jpeg_quality) {
            Ok(jpeg) => StreamEvent::Frame {
                image: BASE64.encode(&jpeg),
                caption,
                detections: located,
            },
            Err(e) => StreamEvent::Error {
                message: format!("Failed to encode frame: {}", e),
                fatal: false,
            },
        }
    }
}

/// Launches session loops and fans their events out to subscribers
pub struct StreamPublisher {
    context: Arc<SessionContext>,
    sessions: Mutex<Vec<JoinHandle<()>>>,
}

impl StreamPublisher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        camera: Arc<CameraManager>,
        detectors: DetectorSet,
        analyzer: SpatialAnalyzer,
        generator: GuidanceGenerator,
        overlays: ModeOverlays,
        speech: Arc<SpeechDispatcher>,
        modes: Arc<ModeController>,
        settings: StreamConfig,
        jpeg_quality: u8,
    ) -> Self {
        let capacity = settings.channel_capacity.max(1);
        let (navigation_tx, _) = broadcast::channel(capacity);
        let (description_tx, _) = broadcast::channel(capacity);

        Self {
            context: Arc::new(SessionContext {
                camera,
                detectors,
                analyzer,
                generator,
                overlays,
                speech,
                modes,
                settings,
                jpeg_quality,
                navigation_tx,
                description_tx,
            }),
            sessions: Mutex::new(Vec::new()),
        }
    }

    /// Receive every event published for `mode` from now on
    pub fn subscribe(&self, mode: Mode) -> broadcast::Receiver<StreamEvent> {
        self.context.channel(mode).subscribe()
    }

    /// Run the session for a freshly started mode on a blocking thread
    pub fn launch(&self, token: SessionToken) {
        let context = self.context.clone();
        info!("Launching {} session {}", token.mode(), token.generation());
        let handle = tokio::task::spawn_blocking(move || context.run(token));

        let mut sessions = self.sessions.lock();
        sessions.retain(|h| !h.is_finished());
        sessions.push(handle);
    }

    /// Wait for session loops to exit, up to `timeout`
    pub async fn wait_idle(&self, timeout: Duration) {
        let sessions: Vec<_> = self.sessions.lock().drain(..).collect();
        if sessions.is_empty() {
            return;
        }
        let all = futures::future::join_all(sessions);
        if tokio::time::timeout(timeout, all).await.is_err() {
            warn!("Stream sessions still running after {:?}", timeout);
        }
    }
}
