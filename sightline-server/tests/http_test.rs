//! HTTP routes and streaming sessions against fake devices

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use parking_lot::Mutex;
use serde_json::Value;
use sightline_core::{BoundingBox, Detection, Direction, Mode};
use sightline_eye::{
    CameraManager, Detector, DetectorSet, Frame, FrameCapture, FrameSource, TextRecognizer,
    UnavailableSource, VisionError,
};
use sightline_server::http::{create_router, ApiState};
use sightline_server::{Assistant, AssistantParts, SightlineConfig, StartOutcome, StreamEvent};
use sightline_sos::{
    AudioSample, Geolocator, Location, Messenger, RecognitionError, SosError, SpeechRecognizer,
};
use sightline_spk::{CustomTtsEngine, SpeechDispatcher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// Camera whose reads start failing after `good_reads` frames in total
struct FakeCamera {
    good_reads: Option<usize>,
    reads: Arc<AtomicUsize>,
}

struct FakeCapture {
    good_reads: Option<usize>,
    reads: Arc<AtomicUsize>,
}

impl FrameCapture for FakeCapture {
    fn read(&mut self) -> Result<Frame, VisionError> {
        let read = self.reads.fetch_add(1, Ordering::SeqCst);
        match self.good_reads {
            Some(limit) if read >= limit => Err(VisionError::Camera("device unplugged".to_string())),
            _ => Ok(Frame::filled(640, 480, [40, 40, 40])),
        }
    }
}

impl FrameSource for FakeCamera {
    fn open(&self) -> Result<Box<dyn FrameCapture>, VisionError> {
        Ok(Box::new(FakeCapture {
            good_reads: self.good_reads,
            reads: self.reads.clone(),
        }))
    }

    fn name(&self) -> &str {
        "fake"
    }
}

struct FixedDetector(Vec<Detection>);

impl Detector for FixedDetector {
    fn detect(&self, _frame: &Frame) -> Result<Vec<Detection>, VisionError> {
        Ok(self.0.clone())
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

/// Fails its first call, then reports one person ahead
#[derive(Default)]
struct FlakyDetector {
    calls: AtomicUsize,
}

impl Detector for FlakyDetector {
    fn detect(&self, _frame: &Frame) -> Result<Vec<Detection>, VisionError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(VisionError::Model("inference failed".to_string()));
        }
        Ok(vec![Detection::new("person", BoundingBox::new(270, 100, 370, 400))])
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

/// Camera that refuses to open while another capture is alive
#[derive(Default)]
struct ExclusiveCamera {
    in_use: Arc<AtomicUsize>,
}

struct ExclusiveCapture {
    in_use: Arc<AtomicUsize>,
}

impl FrameCapture for ExclusiveCapture {
    fn read(&mut self) -> Result<Frame, VisionError> {
        Ok(Frame::filled(640, 480, [40, 40, 40]))
    }
}

impl Drop for ExclusiveCapture {
    fn drop(&mut self) {
        self.in_use.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FrameSource for ExclusiveCamera {
    fn open(&self) -> Result<Box<dyn FrameCapture>, VisionError> {
        if self.in_use.fetch_add(1, Ordering::SeqCst) > 0 {
            self.in_use.fetch_sub(1, Ordering::SeqCst);
            return Err(VisionError::Camera("device busy".to_string()));
        }
        Ok(Box::new(ExclusiveCapture {
            in_use: self.in_use.clone(),
        }))
    }

    fn name(&self) -> &str {
        "exclusive"
    }
}

async fn next_event(events: &mut tokio::sync::broadcast::Receiver<StreamEvent>) -> StreamEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap()
}

struct FixedOcr(&'static str);

impl TextRecognizer for FixedOcr {
    fn recognize_text(&self, _image: &image::GrayImage) -> Result<String, VisionError> {
        Ok(self.0.to_string())
    }
}

struct SaysHelp;

impl SpeechRecognizer for SaysHelp {
    fn listen(&self, _timeout: Duration, _phrase_limit: Duration) -> Result<AudioSample, RecognitionError> {
        Ok(AudioSample::new(vec![0; 160], 16000))
    }

    fn transcribe(&self, _audio: &AudioSample) -> Result<String, RecognitionError> {
        Ok("Help me".to_string())
    }
}

struct KnownPlace;

#[async_trait]
impl Geolocator for KnownPlace {
    async fn locate(&self) -> Result<Option<Location>, SosError> {
        Ok(Some(Location {
            latitude: 12.97,
            longitude: 77.59,
            city: "Bengaluru".to_string(),
        }))
    }
}

#[derive(Default)]
struct RecordingMessenger {
    bodies: Mutex<Vec<String>>,
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send(&self, _to: &str, _from: &str, body: &str) -> Result<String, SosError> {
        self.bodies.lock().push(body.to_string());
        Ok("SM1".to_string())
    }
}

struct Harness {
    assistant: Arc<Assistant>,
    spoken: Arc<Mutex<Vec<String>>>,
    messenger: Arc<RecordingMessenger>,
}

impl Harness {
    fn new(source: Arc<dyn FrameSource>, ocr: &'static str) -> Self {
        let person = Detection::new("person", BoundingBox::new(270, 100, 370, 400));
        Self::with_detectors(source, DetectorSet::shared(Arc::new(FixedDetector(vec![person]))), ocr)
    }

    fn with_detectors(source: Arc<dyn FrameSource>, detectors: DetectorSet, ocr: &'static str) -> Self {
        let mut config = SightlineConfig::default();
        config.stream.frame_delay_ms = 5;
        config.sos.twilio.to = "whatsapp:+910000000000".to_string();

        let spoken = Arc::new(Mutex::new(Vec::new()));
        let sink = spoken.clone();
        let engine = CustomTtsEngine::new("recording", move |text: &str| {
            sink.lock().push(text.to_string());
            Ok(())
        });
        let speech = Arc::new(SpeechDispatcher::spawn(Box::new(engine)).unwrap());

        let messenger = Arc::new(RecordingMessenger::default());

        let assistant = Assistant::new(AssistantParts {
            config,
            camera: Arc::new(CameraManager::new(source)),
            detectors,
            ocr: Arc::new(FixedOcr(ocr)),
            speech,
            recognizer: Arc::new(SaysHelp),
            geolocator: Arc::new(KnownPlace),
            messenger: messenger.clone(),
        });

        Self {
            assistant: Arc::new(assistant),
            spoken,
            messenger,
        }
    }

    fn working(ocr: &'static str) -> Self {
        Self::new(
            Arc::new(FakeCamera {
                good_reads: None,
                reads: Arc::new(AtomicUsize::new(0)),
            }),
            ocr,
        )
    }

    fn without_camera() -> Self {
        Self::new(Arc::new(UnavailableSource::new("no camera")), "")
    }

    fn router(&self) -> Router {
        create_router(ApiState {
            assistant: self.assistant.clone(),
        })
    }

    async fn call(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }
}

#[tokio::test]
async fn test_health_reports_idle_modes() {
    let harness = Harness::working("");
    let (status, body) = harness.call("GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["modes"]["navigation"], false);
    assert_eq!(body["modes"]["object_detection"], false);
}

#[tokio::test]
async fn test_mode_transitions_over_http() {
    let harness = Harness::working("");

    let (status, body) = harness.call("POST", "/start_navigation", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Navigation started");
    assert_eq!(body["video_feed"], "/video_feed/navigation");

    let (status, body) = harness.call("POST", "/start_navigation", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Navigation already running");

    let (status, body) = harness.call("POST", "/api/detect-object", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CAMERA_BUSY");
    assert!(!harness.assistant.is_active(Mode::ObjectDetection));

    let (status, body) = harness.call("POST", "/stop_navigation", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Navigation stopped");

    // Stopping an idle mode is a no-op
    let (status, _) = harness.call("POST", "/api/stop-object-detection", None).await;
    assert_eq!(status, StatusCode::OK);

    harness.assistant.shutdown().await;
    assert!(!harness.assistant.is_active(Mode::Navigation));
}

#[tokio::test]
async fn test_unknown_video_feed_is_rejected() {
    let harness = Harness::working("");
    let (status, body) = harness.call("GET", "/video_feed/sightseeing", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid mode");
}

#[tokio::test]
async fn test_idle_video_feed_ends_immediately() {
    let harness = Harness::working("");
    let request = Request::builder()
        .uri("/video_feed/navigation")
        .body(Body::empty())
        .unwrap();
    let response = harness.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = tokio::time::timeout(
        Duration::from_secs(2),
        axum::body::to_bytes(response.into_body(), usize::MAX),
    )
    .await
    .unwrap()
    .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains(r#"data: {"type":"stopped"}"#));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_video_feed_closes_after_stop() {
    let harness = Harness::working("");
    assert!(matches!(
        harness.assistant.start_mode(Mode::ObjectDetection),
        StartOutcome::Started(_)
    ));

    let request = Request::builder()
        .uri("/video_feed/object_detection")
        .body(Body::empty())
        .unwrap();
    let response = harness.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = tokio::spawn(axum::body::to_bytes(response.into_body(), usize::MAX));
    tokio::time::sleep(Duration::from_millis(100)).await;
    harness.assistant.stop_mode(Mode::ObjectDetection);

    let bytes = tokio::time::timeout(Duration::from_secs(5), body)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains(r#""type":"frame""#));
    assert!(text.trim_end().ends_with(r#"data: {"type":"stopped"}"#));

    harness.assistant.shutdown().await;
}

#[tokio::test]
async fn test_session_publishes_captioned_frames_then_stops_on_read_failure() {
    let harness = Harness::new(
        Arc::new(FakeCamera {
            good_reads: Some(3),
            reads: Arc::new(AtomicUsize::new(0)),
        }),
        "",
    );
    let mut events = harness.assistant.subscribe(Mode::ObjectDetection);
    assert!(matches!(
        harness.assistant.start_mode(Mode::ObjectDetection),
        StartOutcome::Started(_)
    ));

    let mut received = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        let done = event == StreamEvent::Stopped;
        received.push(event);
        if done {
            break;
        }
    }

    match &received[0] {
        StreamEvent::Frame {
            image,
            caption,
            detections,
        } => {
            assert!(!image.is_empty());
            assert_eq!(caption.as_deref(), Some("I see person at 1.0m"));
            assert_eq!(detections.len(), 1);
        }
        other => panic!("Expected a frame, got {:?}", other),
    }
    // Only the first frame speaks within the interval
    assert!(matches!(&received[1], StreamEvent::Frame { caption: None, .. }));

    let frames = received
        .iter()
        .filter(|e| matches!(e, StreamEvent::Frame { .. }))
        .count();
    assert_eq!(frames, 3);
    assert!(matches!(
        &received[received.len() - 2],
        StreamEvent::Error { fatal: true, .. }
    ));
    assert!(!harness.assistant.is_active(Mode::ObjectDetection));

    // The mode can be started again after the session ended on its own
    assert!(matches!(
        harness.assistant.start_mode(Mode::ObjectDetection),
        StartOutcome::Started(_)
    ));
    harness.assistant.shutdown().await;
    assert_eq!(harness.spoken.lock()[0], "I see person at 1.0m");
}

#[tokio::test]
async fn test_unopenable_camera_stops_session() {
    let harness = Harness::without_camera();
    let mut events = harness.assistant.subscribe(Mode::Navigation);
    harness.assistant.start_mode(Mode::Navigation);

    let first = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(first, StreamEvent::Error { fatal: true, .. }));
    let second = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second, StreamEvent::Stopped);
    assert!(!harness.assistant.is_active(Mode::Navigation));
}

#[tokio::test]
async fn test_speak_text_queues_speech() {
    let harness = Harness::working("");
    let (status, body) = harness
        .call("POST", "/api/speak-text", Some(serde_json::json!({"text": "Good morning"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "spoken");
    assert_eq!(body["text"], "Good morning");

    // Missing body speaks nothing but still succeeds
    let (status, body) = harness.call("POST", "/api/speak-text", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["text"], "");

    harness.assistant.shutdown().await;
    assert_eq!(*harness.spoken.lock(), vec!["Good morning".to_string()]);
}

#[tokio::test]
async fn test_detect_text_reads_and_speaks() {
    let harness = Harness::working("  EXIT\n");
    let (status, body) = harness.call("POST", "/api/detect-text", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], "Detected Text: EXIT");
    assert!(!body["image"].as_str().unwrap().is_empty());

    harness.assistant.shutdown().await;
    assert_eq!(*harness.spoken.lock(), vec!["EXIT".to_string()]);
}

#[tokio::test]
async fn test_detect_text_still_answers_when_speech_is_down() {
    let harness = Harness::working("EXIT");
    harness.assistant.shutdown().await;
    assert!(harness.assistant.speak("hello").is_err());

    let (status, body) = harness.call("POST", "/api/detect-text", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], "Detected Text: EXIT");
    assert!(harness.spoken.lock().is_empty());
}

#[tokio::test]
async fn test_detect_text_without_text() {
    let harness = Harness::working(" \n ");
    let (status, body) = harness.call("POST", "/api/detect-text", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], "No readable text found in the frame.");
}

#[tokio::test]
async fn test_detect_text_without_camera() {
    let harness = Harness::without_camera();
    let (status, body) = harness.call("POST", "/api/detect-text", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"], "Failed to capture frame from webcam.");
}

#[tokio::test]
async fn test_webcam_check() {
    let harness = Harness::working("");
    let (status, body) = harness.call("GET", "/api/test-webcam", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Webcam test passed");

    let harness = Harness::without_camera();
    let (status, body) = harness.call("GET", "/api/test-webcam", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Could not open webcam");
}

#[tokio::test]
async fn test_voice_command_sos_sends_alert() {
    let harness = Harness::working("");
    let (status, body) = harness.call("POST", "/api/voice-command-sos", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["command"], "help me");
    assert_eq!(body["status"], "SOS Sent");
    assert_eq!(body["location"], "https://www.google.com/maps?q=12.97,77.59");

    let bodies = harness.messenger.bodies.lock();
    assert_eq!(bodies.len(), 1);
    assert!(bodies[0].contains("Bengaluru"));
}

#[tokio::test]
async fn test_navigation_session_speaks_guidance() {
    let harness = Harness::working("");
    let mut events = harness.assistant.subscribe(Mode::Navigation);
    assert!(matches!(
        harness.assistant.start_mode(Mode::Navigation),
        StartOutcome::Started(_)
    ));

    match next_event(&mut events).await {
        StreamEvent::Frame { caption, detections, .. } => {
            assert_eq!(caption.as_deref(), Some("Obstacle ahead at 1.0 meters, turn right"));
            assert_eq!(detections[0].direction, Direction::Ahead);
        }
        other => panic!("Expected a frame, got {:?}", other),
    }

    harness.assistant.stop_mode(Mode::Navigation);
    harness.assistant.shutdown().await;
    assert_eq!(
        harness.spoken.lock()[0],
        "Obstacle ahead at 1.0 meters, turn right"
    );
}

#[tokio::test]
async fn test_detector_failure_keeps_session_running() {
    let harness = Harness::with_detectors(
        Arc::new(FakeCamera {
            good_reads: None,
            reads: Arc::new(AtomicUsize::new(0)),
        }),
        DetectorSet::shared(Arc::new(FlakyDetector::default())),
        "",
    );
    let mut events = harness.assistant.subscribe(Mode::ObjectDetection);
    harness.assistant.start_mode(Mode::ObjectDetection);

    match next_event(&mut events).await {
        StreamEvent::Error { message, fatal } => {
            assert!(!fatal);
            assert!(message.contains("inference failed"));
        }
        other => panic!("Expected a detection error, got {:?}", other),
    }
    match next_event(&mut events).await {
        StreamEvent::Frame { caption, .. } => {
            assert_eq!(caption.as_deref(), Some("I see person at 1.0m"));
        }
        other => panic!("Expected a frame, got {:?}", other),
    }
    assert!(harness.assistant.is_active(Mode::ObjectDetection));

    harness.assistant.stop_mode(Mode::ObjectDetection);
    loop {
        if next_event(&mut events).await == StreamEvent::Stopped {
            break;
        }
    }
    harness.assistant.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_switching_modes_hands_camera_over() {
    let harness = Harness::new(Arc::new(ExclusiveCamera::default()), "");
    let mut navigation = harness.assistant.subscribe(Mode::Navigation);
    let mut description = harness.assistant.subscribe(Mode::ObjectDetection);

    harness.assistant.start_mode(Mode::Navigation);
    assert!(matches!(next_event(&mut navigation).await, StreamEvent::Frame { .. }));

    harness.assistant.stop_mode(Mode::Navigation);
    assert!(matches!(
        harness.assistant.start_mode(Mode::ObjectDetection),
        StartOutcome::Started(_)
    ));

    match next_event(&mut description).await {
        StreamEvent::Frame { .. } => {}
        other => panic!("Object detection did not get the camera: {:?}", other),
    }
    assert!(harness.assistant.is_active(Mode::ObjectDetection));

    // Restarting the same mode also waits for its previous session
    harness.assistant.stop_mode(Mode::ObjectDetection);
    harness.assistant.start_mode(Mode::ObjectDetection);
    loop {
        match next_event(&mut description).await {
            StreamEvent::Error { message, .. } => panic!("Restart lost the camera: {}", message),
            StreamEvent::Stopped => break,
            StreamEvent::Frame { .. } => {}
        }
    }
    assert!(matches!(next_event(&mut description).await, StreamEvent::Frame { .. }));
    assert!(harness.assistant.is_active(Mode::ObjectDetection));

    harness.assistant.shutdown().await;
}
