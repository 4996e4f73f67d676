//! Microphone level tracking, phrase segmentation and the speech API wire format

use crate::error::RecognitionError;
use crate::recognizer::AudioSample;
use serde::Deserialize;
use std::time::Duration;

/// Samples per analysed chunk
pub const CHUNK_SAMPLES: usize = 1024;

/// Root mean square level of 16-bit samples
pub fn rms(samples: &[i16]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (sum / samples.len() as f64).sqrt()
}

pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
}

/// Average interleaved frames of `channels` samples down to mono
pub fn downmix<T: Copy>(data: &[T], channels: usize, to_i16: impl Fn(T) -> i16) -> Vec<i16> {
    if channels <= 1 {
        return data.iter().map(|&s| to_i16(s)).collect();
    }
    data.chunks(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| i32::from(to_i16(s))).sum();
            (sum / frame.len() as i32) as i16
        })
        .collect()
}

/// Speech level threshold that follows the ambient noise
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyThreshold {
    value: f64,
    ratio: f64,
}

impl EnergyThreshold {
    pub fn new(value: f64, ratio: f64) -> Self {
        Self { value, ratio }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Move towards `ratio` times the level of an ambient chunk lasting `seconds`
    pub fn adjust(&mut self, level: f64, seconds: f64) {
        let damping = 0.15f64.powf(seconds);
        let target = level * self.ratio;
        self.value = self.value * damping + target * (1.0 - damping);
    }
}

/// Where a [`PhraseDetector`] is after the audio pushed so far
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhraseState {
    /// No speech yet
    Waiting,
    Recording,
    /// Speech ended with a pause or reached the phrase limit
    Complete,
    /// No speech started within the timeout
    TimedOut,
}

/// Splits microphone audio into one spoken phrase
#[derive(Debug)]
pub struct PhraseDetector {
    threshold: f64,
    sample_rate: u32,
    timeout_samples: usize,
    limit_samples: usize,
    pause_samples: usize,
    waited: usize,
    silence: usize,
    pending: Vec<i16>,
    recorded: Vec<i16>,
    state: PhraseState,
}

fn samples_in(duration: Duration, sample_rate: u32) -> usize {
    (duration.as_secs_f64() * f64::from(sample_rate)).ceil() as usize
}

impl PhraseDetector {
    pub fn new(threshold: f64, sample_rate: u32, timeout: Duration, phrase_limit: Duration, pause: Duration) -> Self {
        Self {
            threshold,
            sample_rate,
            timeout_samples: samples_in(timeout, sample_rate),
            limit_samples: samples_in(phrase_limit, sample_rate),
            pause_samples: samples_in(pause, sample_rate),
            waited: 0,
            silence: 0,
            pending: Vec::with_capacity(CHUNK_SAMPLES),
            recorded: Vec::new(),
            state: PhraseState::Waiting,
        }
    }

    pub fn state(&self) -> PhraseState {
        self.state
    }

    /// Feed mono samples; anything after the phrase ends is ignored
    pub fn push(&mut self, samples: &[i16]) -> PhraseState {
        self.pending.extend_from_slice(samples);
        while self.pending.len() >= CHUNK_SAMPLES && !self.is_done() {
            let chunk: Vec<i16> = self.pending.drain(..CHUNK_SAMPLES).collect();
            self.process(&chunk);
        }
        self.state
    }

    fn is_done(&self) -> bool {
        matches!(self.state, PhraseState::Complete | PhraseState::TimedOut)
    }

    fn process(&mut self, chunk: &[i16]) {
        let loud = rms(chunk) > self.threshold;
        match self.state {
            PhraseState::Waiting if loud => {
                self.state = PhraseState::Recording;
                self.recorded.extend_from_slice(chunk);
            }
            PhraseState::Waiting => {
                self.waited += chunk.len();
                if self.waited >= self.timeout_samples {
                    self.state = PhraseState::TimedOut;
                }
            }
            PhraseState::Recording => {
                self.recorded.extend_from_slice(chunk);
                self.silence = if loud { 0 } else { self.silence + chunk.len() };
                if self.silence >= self.pause_samples || self.recorded.len() >= self.limit_samples {
                    self.state = PhraseState::Complete;
                }
            }
            PhraseState::Complete | PhraseState::TimedOut => {}
        }
    }

    /// The recorded phrase, or `Timeout` if speech never started
    pub fn finish(self) -> Result<AudioSample, RecognitionError> {
        match self.state {
            PhraseState::Waiting | PhraseState::TimedOut => Err(RecognitionError::Timeout),
            PhraseState::Recording | PhraseState::Complete => Ok(AudioSample::new(self.recorded, self.sample_rate)),
        }
    }
}

/// Request body for `audio/l16`: big-endian 16-bit PCM
pub fn l16_body(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_be_bytes()).collect()
}

#[derive(Debug, Deserialize)]
struct SpeechResponse {
    #[serde(default)]
    result: Vec<SpeechResult>,
}

#[derive(Debug, Deserialize)]
struct SpeechResult {
    #[serde(default)]
    alternative: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    #[serde(default)]
    transcript: String,
    confidence: Option<f64>,
}

/// Pick the transcript from a web speech API v2 response.
///
/// The body holds one JSON object per line; the first is usually an empty
/// result. The most confident alternative wins, else the first one.
pub fn parse_transcript(body: &str) -> Result<String, RecognitionError> {
    for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let response: SpeechResponse = serde_json::from_str(line)
            .map_err(|e| RecognitionError::Other(format!("Malformed speech service response: {}", e)))?;
        let Some(result) = response.result.into_iter().next() else {
            continue;
        };

        let best = if result.alternative.iter().any(|a| a.confidence.is_some()) {
            result.alternative.into_iter().max_by(|a, b| {
                let (a, b) = (a.confidence.unwrap_or(0.0), b.confidence.unwrap_or(0.0));
                a.total_cmp(&b)
            })
        } else {
            result.alternative.into_iter().next()
        };

        return match best {
            Some(alt) if !alt.transcript.trim().is_empty() => Ok(alt.transcript),
            _ => Err(RecognitionError::Unintelligible),
        };
    }
    Err(RecognitionError::Unintelligible)
}
