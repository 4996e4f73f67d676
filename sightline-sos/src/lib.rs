//! sightline-sos: emergency alert by voice
//!
//! Listens for a spoken command, compares it to the trigger phrase and, on a
//! match, sends the user's approximate location to a guardian over WhatsApp.

pub mod audio;
pub mod config;
pub mod error;
pub mod geolocation;
pub mod messaging;
#[cfg(feature = "stt")]
pub mod microphone;
pub mod pipeline;
pub mod recognizer;
pub mod similarity;

pub use config::{RecognizerConfig, SosConfig, TwilioConfig};
pub use error::{RecognitionError, SosError};
pub use geolocation::{Geolocator, IpGeolocator, Location};
pub use messaging::{Messenger, TwilioMessenger};
#[cfg(feature = "stt")]
pub use microphone::MicrophoneRecognizer;
pub use pipeline::{SosOutcome, SosPipeline, SosResponse};
pub use recognizer::{AudioSample, SpeechRecognizer, UnavailableRecognizer};
pub use similarity::similarity;
