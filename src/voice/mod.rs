//! Voice collaborators
//!
//! Microphone capture, speaker playback, and HTTP-backed STT and TTS.

use std::time::Duration;

use crate::{Error, Result};

mod capture;
mod playback;
mod stt;
mod tts;

pub use capture::{AudioCapture, MicrophoneSource, SAMPLE_RATE, record_blocking, samples_to_wav};
pub use playback::{AudioPlayback, PLAYBACK_SAMPLE_RATE, SpeakerSink, decode_audio};
pub use stt::{SpeechToText, SttProvider};
pub use tts::{TextToSpeech, TtsProvider};

/// HTTP client for a speech provider; every request gives up after `timeout`
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    if timeout.is_zero() {
        return Err(Error::Config("speech request timeout must be positive".to_string()));
    }
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Config(e.to_string()))
}
