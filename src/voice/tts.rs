//! Text-to-speech (TTS) over HTTP

use std::time::Duration;

use async_trait::async_trait;

use super::http_client;
use crate::orchestrator::Synthesizer;
use crate::{Error, Result};

const OPENAI_SPEECH_URL: &str = "https://api.openai.com/v1/audio/speech";
const ELEVENLABS_URL: &str = "https://api.elevenlabs.io/v1/text-to-speech";

/// TTS provider backend
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TtsProvider {
    OpenAI,
    ElevenLabs,
}

impl TtsProvider {
    /// Parse a provider name from configuration
    ///
    /// # Errors
    ///
    /// Returns `Config` for unknown provider names
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "elevenlabs" => Ok(Self::ElevenLabs),
            other => Err(Error::Config(format!("unknown TTS provider: {other}"))),
        }
    }
}

/// Synthesizes speech from text
pub struct TextToSpeech {
    client: reqwest::Client,
    api_key: String,
    voice: String,
    speed: f32,
    model: String,
    provider: TtsProvider,
    timeout: Duration,
}

impl TextToSpeech {
    /// Create a new TTS instance using `OpenAI`
    ///
    /// # Errors
    ///
    /// Returns `Config` if the API key is missing, the speed is out of range,
    /// or `timeout` is zero
    pub fn new_openai(
        api_key: String,
        voice: String,
        speed: f32,
        model: String,
        timeout: Duration,
    ) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("OpenAI API key required for TTS".to_string()));
        }
        if !(0.25..=4.0).contains(&speed) {
            return Err(Error::Config(format!(
                "TTS speed {speed} outside 0.25..=4.0"
            )));
        }

        Ok(Self {
            client: http_client(timeout)?,
            api_key,
            voice,
            speed,
            model,
            provider: TtsProvider::OpenAI,
            timeout,
        })
    }

    /// Create a new TTS instance using ElevenLabs
    ///
    /// # Errors
    ///
    /// Returns `Config` if the API key is missing or `timeout` is zero
    pub fn new_elevenlabs(
        api_key: String,
        voice_id: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "ElevenLabs API key required for TTS".to_string(),
            ));
        }

        Ok(Self {
            client: http_client(timeout)?,
            api_key,
            voice: voice_id,
            speed: 1.0,
            model,
            provider: TtsProvider::ElevenLabs,
            timeout,
        })
    }

    /// Per-request timeout
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Synthesize using OpenAI TTS
    async fn synthesize_openai(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
        }

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: self.speed,
        };

        let response = self
            .client
            .post(OPENAI_SPEECH_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Synthesis(e.to_string()))?;

        audio_body(response, "OpenAI").await
    }

    /// Synthesize using ElevenLabs TTS
    async fn synthesize_elevenlabs(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct ElevenLabsRequest<'a> {
            text: &'a str,
            model_id: &'a str,
        }

        let url = format!("{ELEVENLABS_URL}/{}", self.voice);

        let request = ElevenLabsRequest {
            text,
            model_id: &self.model,
        };

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Synthesis(e.to_string()))?;

        audio_body(response, "ElevenLabs").await
    }
}

/// Audio bytes of a successful response, or the provider's error text
async fn audio_body(response: reqwest::Response, provider: &str) -> Result<Vec<u8>> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Synthesis(format!("{provider} returned {status}: {body}")));
    }

    response
        .bytes()
        .await
        .map(|b| b.to_vec())
        .map_err(|e| Error::Synthesis(e.to_string()))
}

#[async_trait]
impl Synthesizer for TextToSpeech {
    /// Returns MP3 audio bytes
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        tracing::debug!(chars = text.len(), provider = ?self.provider, "synthesizing speech");
        let audio = match self.provider {
            TtsProvider::OpenAI => self.synthesize_openai(text).await?,
            TtsProvider::ElevenLabs => self.synthesize_elevenlabs(text).await?,
        };
        if audio.is_empty() {
            return Err(Error::Synthesis("provider returned no audio".to_string()));
        }
        tracing::debug!(audio_bytes = audio.len(), "speech synthesized");
        Ok(audio)
    }
}
