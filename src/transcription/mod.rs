//! Speech-to-text: adapter contract, waveform parsing, and the HTTP
//! recognizer client.
//!
//! The recognizer is a black-box vendor service. The contract distinguishes
//! the two failure modes the client cares about: "nobody could understand
//! that clip" (try again) versus "the service is down" (not your fault).

pub mod google;
pub mod wav;

pub use google::GoogleSpeechClient;
pub use wav::{parse_wav, WavInfo};

use async_trait::async_trait;
use thiserror::Error;

/// Errors from one recognition attempt.
#[derive(Debug, Error)]
pub enum TranscriptionError {
    /// The clip contained no recognizable speech.
    #[error("could not understand audio")]
    Unintelligible,

    /// The recognizer service was unreachable or answered abnormally.
    #[error("speech recognition service error: {0}")]
    Service(String),

    /// The waveform handed to the adapter was not a usable WAV container.
    #[error("invalid waveform: {0}")]
    InvalidWaveform(String),
}

/// Converts a complete waveform into text.
///
/// The whole clip is one utterance: no streaming, no partial results.
/// Implementors must be `Send + Sync` so a single client instance serves
/// every pipeline worker concurrently.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn recognize(&self, wav: &[u8]) -> Result<String, TranscriptionError>;
}
