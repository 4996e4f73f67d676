// HTTP command surface and Server-Sent Events frame streams

use crate::assistant::{Assistant, TextReading};
use crate::modes::{ModeState, StartOutcome};
use crate::publisher::StreamEvent;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
    routing::{get, post},
    Router,
};
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use sightline_core::Mode;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct ApiState {
    pub assistant: Arc<Assistant>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub modes: ModeState,
}

#[derive(Debug, Serialize)]
pub struct ModeResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_feed: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TextResponse {
    pub result: String,
    pub image: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SpeakRequest {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct SpeakResponse {
    pub status: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

fn error_response(status: StatusCode, error: impl Into<String>, code: Option<&str>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.map(str::to_string),
        }),
    )
        .into_response()
}

/// Create HTTP router with all routes
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/start_navigation", post(start_navigation_handler))
        .route("/stop_navigation", post(stop_navigation_handler))
        .route("/api/detect-object", post(start_object_detection_handler))
        .route("/api/stop-object-detection", post(stop_object_detection_handler))
        .route("/video_feed/:mode", get(video_feed_handler))
        .route("/api/detect-text", post(detect_text_handler))
        .route("/api/speak-text", post(speak_text_handler))
        .route("/api/voice-command-sos", post(voice_command_sos_handler))
        .route("/api/test-webcam", get(test_webcam_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        modes: state.assistant.mode_state(),
    })
}

fn start_mode(state: &ApiState, mode: Mode) -> Response {
    match state.assistant.start_mode(mode) {
        StartOutcome::Started(_) => Json(ModeResponse {
            message: format!("{} started", mode.display_name()),
            video_feed: Some(format!("/video_feed/{}", mode.as_str())),
        })
        .into_response(),
        StartOutcome::AlreadyRunning => Json(ModeResponse {
            message: format!("{} already running", mode.display_name()),
            video_feed: Some(format!("/video_feed/{}", mode.as_str())),
        })
        .into_response(),
        StartOutcome::CameraBusy(active) => error_response(
            StatusCode::CONFLICT,
            format!("Camera is in use by {}", active.display_name().to_lowercase()),
            Some("CAMERA_BUSY"),
        ),
    }
}

fn stop_mode(state: &ApiState, mode: Mode) -> Response {
    state.assistant.stop_mode(mode);
    Json(ModeResponse {
        message: format!("{} stopped", mode.display_name()),
        video_feed: None,
    })
    .into_response()
}

async fn start_navigation_handler(State(state): State<ApiState>) -> Response {
    start_mode(&state, Mode::Navigation)
}

async fn stop_navigation_handler(State(state): State<ApiState>) -> Response {
    stop_mode(&state, Mode::Navigation)
}

async fn start_object_detection_handler(State(state): State<ApiState>) -> Response {
    start_mode(&state, Mode::ObjectDetection)
}

async fn stop_object_detection_handler(State(state): State<ApiState>) -> Response {
    stop_mode(&state, Mode::ObjectDetection)
}

/// Live frames of one mode as Server-Sent Events.
///
/// Each event carries one JSON encoded [`StreamEvent`]; the stream ends
/// after the session's `stopped` event.
async fn video_feed_handler(State(state): State<ApiState>, Path(mode): Path<String>) -> Response {
    let mode: Mode = match mode.parse() {
        Ok(mode) => mode,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "Invalid mode", None),
    };

    // Subscribe before checking the state so a stop in between still
    // delivers the stopped event
    let receiver = state.assistant.subscribe(mode);
    let events = if state.assistant.is_active(mode) {
        info!("Client subscribed to {} stream", mode);
        sse_events(BroadcastStream::new(receiver)).boxed()
    } else {
        stream::iter(vec![to_sse(&StreamEvent::Stopped)]).boxed()
    };

    Sse::new(events).keep_alive(KeepAlive::default()).into_response()
}

fn sse_events(
    events: BroadcastStream<StreamEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    events
        .filter_map(|item| async move {
            match item {
                Ok(event) => Some(event),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!("Stream subscriber lagged, skipped {} events", skipped);
                    None
                }
            }
        })
        .scan(false, |finished, event| {
            // Emit the terminal event, then end the stream
            if *finished {
                return futures::future::ready(None);
            }
            *finished = matches!(event, StreamEvent::Stopped);
            futures::future::ready(Some(event))
        })
        .map(|event| to_sse(&event))
}

fn to_sse(event: &StreamEvent) -> Result<Event, Infallible> {
    let event = match serde_json::to_string(event) {
        Ok(json) => Event::default().data(json),
        Err(e) => {
            error!("Failed to serialize stream event: {}", e);
            Event::default().comment("serialization error")
        }
    };
    Ok(event)
}

async fn detect_text_handler(State(state): State<ApiState>) -> Response {
    match state.assistant.read_text().await {
        Ok(TextReading::Read { result, image }) => Json(TextResponse { result, image }).into_response(),
        Ok(TextReading::CaptureFailed) => Json(ErrorResponse {
            error: "Failed to capture frame from webcam.".to_string(),
            code: None,
        })
        .into_response(),
        Err(e) => {
            error!("Text detection failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string(), Some("TEXT_DETECTION_ERROR"))
        }
    }
}

async fn speak_text_handler(State(state): State<ApiState>, body: Option<Json<SpeakRequest>>) -> Response {
    let text = body.map(|Json(request)| request.text).unwrap_or_default();
    if let Err(e) = state.assistant.speak(&text) {
        warn!("Could not queue text: {}", e);
        return error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string(), Some("SPEECH_UNAVAILABLE"));
    }
    Json(SpeakResponse {
        status: "spoken".to_string(),
        text,
    })
    .into_response()
}

async fn voice_command_sos_handler(State(state): State<ApiState>) -> Response {
    match state.assistant.voice_sos().await {
        Ok(outcome) => Json(outcome.to_response()).into_response(),
        Err(e) => {
            error!("SOS pipeline failed: {}", e);
            Json(ErrorResponse {
                error: e.to_string(),
                code: None,
            })
            .into_response()
        }
    }
}

async fn test_webcam_handler(State(state): State<ApiState>) -> Response {
    match state.assistant.test_camera().await {
        Ok(()) => Json(StatusResponse {
            status: "Webcam test passed".to_string(),
        })
        .into_response(),
        Err(e) => {
            warn!("Webcam test failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Could not open webcam", None)
        }
    }
}
