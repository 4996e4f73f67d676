//! Microphone capture through cpal with transcription by the web speech API

use crate::audio::{downmix, f32_to_i16, l16_body, parse_transcript, rms, EnergyThreshold, PhraseDetector, PhraseState};
use crate::config::RecognizerConfig;
use crate::error::{RecognitionError, SosError};
use crate::recognizer::{AudioSample, SpeechRecognizer};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SupportedStreamConfig};
use crossbeam_channel::{bounded, RecvTimeoutError};
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Longest gap between audio callbacks before the device is considered stalled
const STALL_TIMEOUT: Duration = Duration::from_secs(2);
const CALLBACK_QUEUE: usize = 64;

/// Listens on an input device and transcribes with Google's web speech API
pub struct MicrophoneRecognizer {
    config: RecognizerConfig,
    threshold: Mutex<EnergyThreshold>,
}

impl MicrophoneRecognizer {
    /// Fails when the API key is missing or no input device is found
    pub fn new(config: RecognizerConfig) -> Result<Self, SosError> {
        if config.api_key.is_empty() {
            return Err(SosError::Config(
                "Speech recognition API key not configured (SIGHTLINE_SPEECH_API_KEY)".to_string(),
            ));
        }
        let device = find_device(config.device_name.as_deref())
            .map_err(|e| SosError::Config(format!("No microphone: {}", e)))?;
        info!(
            "Speech recognition on input device {}",
            device.name().unwrap_or_else(|_| "unknown".to_string())
        );

        let threshold = EnergyThreshold::new(config.energy_threshold, config.dynamic_energy_ratio);
        Ok(Self {
            config,
            threshold: Mutex::new(threshold),
        })
    }

    fn input(&self) -> Result<(Device, SupportedStreamConfig), RecognitionError> {
        let device = find_device(self.config.device_name.as_deref()).map_err(RecognitionError::Other)?;
        let supported = device
            .default_input_config()
            .map_err(|e| RecognitionError::Other(format!("Failed to read input config: {}", e)))?;
        Ok((device, supported))
    }

    /// Stream mono chunks to `on_chunk` until it returns false or `max` passes.
    ///
    /// The cpal stream lives only for this call.
    fn capture(
        &self,
        device: &Device,
        supported: &SupportedStreamConfig,
        max: Duration,
        mut on_chunk: impl FnMut(&[i16]) -> bool,
    ) -> Result<(), RecognitionError> {
        let (tx, rx) = bounded::<Vec<i16>>(CALLBACK_QUEUE);
        let stream = build_stream(device, supported, tx)?;
        stream
            .play()
            .map_err(|e| RecognitionError::Other(format!("Failed to start microphone: {}", e)))?;

        let started = Instant::now();
        loop {
            let elapsed = started.elapsed();
            if elapsed >= max {
                break;
            }
            match rx.recv_timeout(STALL_TIMEOUT.min(max - elapsed)) {
                Ok(chunk) => {
                    if !on_chunk(&chunk) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) if started.elapsed() >= max => break,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(RecognitionError::Other("Microphone stopped delivering audio".to_string()));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(RecognitionError::Other("Microphone stream closed".to_string()));
                }
            }
        }

        drop(stream);
        Ok(())
    }

    fn request_url(&self) -> String {
        format!(
            "{}?client=chromium&lang={}&key={}&pFilter=0",
            self.config.api_url, self.config.language, self.config.api_key
        )
    }
}

fn find_device(name: Option<&str>) -> Result<Device, String> {
    let host = cpal::default_host();
    match name {
        Some(name) => host
            .input_devices()
            .map_err(|e| format!("Failed to enumerate input devices: {}", e))?
            .find(|d| d.name().map(|n| n == name || n.contains(name)).unwrap_or(false))
            .ok_or_else(|| format!("Input device {} not found", name)),
        None => host
            .default_input_device()
            .ok_or_else(|| "No default input device".to_string()),
    }
}

fn build_stream(
    device: &Device,
    supported: &SupportedStreamConfig,
    tx: crossbeam_channel::Sender<Vec<i16>>,
) -> Result<cpal::Stream, RecognitionError> {
    let config = supported.config();
    let channels = usize::from(config.channels);
    let on_error = |err: cpal::StreamError| error!("Microphone stream error: {}", err);

    let stream = match supported.sample_format() {
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                // Drop audio rather than block the device callback
                let _ = tx.try_send(downmix(data, channels, f32_to_i16));
            },
            on_error,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let _ = tx.try_send(downmix(data, channels, |s| s));
            },
            on_error,
            None,
        ),
        other => {
            return Err(RecognitionError::Other(format!("Unsupported sample format {:?}", other)));
        }
    };
    stream.map_err(|e| RecognitionError::Other(format!("Failed to open microphone: {}", e)))
}

impl SpeechRecognizer for MicrophoneRecognizer {
    fn calibrate(&self, duration: Duration) -> Result<(), RecognitionError> {
        let (device, supported) = self.input()?;
        let rate = f64::from(supported.sample_rate().0);
        let mut threshold = *self.threshold.lock();

        self.capture(&device, &supported, duration, |chunk| {
            threshold.adjust(rms(chunk), chunk.len() as f64 / rate);
            true
        })?;

        debug!("Energy threshold calibrated to {:.0}", threshold.value());
        *self.threshold.lock() = threshold;
        Ok(())
    }

    fn listen(&self, timeout: Duration, phrase_limit: Duration) -> Result<AudioSample, RecognitionError> {
        let (device, supported) = self.input()?;
        let threshold = self.threshold.lock().value();
        let mut phrase = PhraseDetector::new(
            threshold,
            supported.sample_rate().0,
            timeout,
            phrase_limit,
            self.config.pause_threshold(),
        );

        // Timeout counts audio, so allow the wall clock some slack
        let max = timeout.saturating_add(phrase_limit).saturating_add(STALL_TIMEOUT);
        self.capture(&device, &supported, max, |chunk| {
            !matches!(phrase.push(chunk), PhraseState::Complete | PhraseState::TimedOut)
        })?;
        phrase.finish()
    }

    fn transcribe(&self, audio: &AudioSample) -> Result<String, RecognitionError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.config.request_timeout())
            .build()
            .map_err(|e| RecognitionError::Other(format!("Failed to create HTTP client: {}", e)))?;

        let response = client
            .post(self.request_url())
            .header("Content-Type", format!("audio/l16; rate={};", audio.sample_rate))
            .body(l16_body(&audio.samples))
            .send()
            .map_err(|e| RecognitionError::Other(format!("Could not request results from speech service: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            warn!("Speech service returned {}", status);
            return Err(RecognitionError::Other(format!("Speech service returned {}", status)));
        }
        let body = response
            .text()
            .map_err(|e| RecognitionError::Other(format!("Failed to read speech service response: {}", e)))?;
        parse_transcript(&body)
    }
}
