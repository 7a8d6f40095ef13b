//! Speech-to-text (STT) over HTTP

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::http_client;
use crate::orchestrator::Transcriber;
use crate::{Error, Result};

const WHISPER_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
const DEEPGRAM_URL: &str = "https://api.deepgram.com/v1/listen";

/// Response from OpenAI Whisper transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Response from Deepgram transcription API
#[derive(serde::Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(serde::Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(serde::Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(serde::Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

impl DeepgramResponse {
    fn into_transcript(self) -> String {
        self.results
            .channels
            .into_iter()
            .next()
            .and_then(|c| c.alternatives.into_iter().next())
            .map(|a| a.transcript)
            .unwrap_or_default()
    }
}

/// STT provider backend
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SttProvider {
    Whisper,
    Deepgram,
}

impl SttProvider {
    /// Parse a provider name from configuration
    ///
    /// # Errors
    ///
    /// Returns `Config` for unknown provider names
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "whisper" | "openai" => Ok(Self::Whisper),
            "deepgram" => Ok(Self::Deepgram),
            other => Err(Error::Config(format!("unknown STT provider: {other}"))),
        }
    }
}

/// Transcribes speech to text
pub struct SpeechToText {
    client: reqwest::Client,
    api_key: String,
    model: String,
    provider: SttProvider,
    timeout: Duration,
}

impl SpeechToText {
    /// Create a new STT instance for `provider`
    ///
    /// # Errors
    ///
    /// Returns `Config` if the API key is missing or `timeout` is zero
    pub fn new(
        provider: SttProvider,
        api_key: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self> {
        if api_key.is_empty() {
            let which = match provider {
                SttProvider::Whisper => "OpenAI API key required for Whisper",
                SttProvider::Deepgram => "Deepgram API key required",
            };
            return Err(Error::Config(which.to_string()));
        }

        Ok(Self {
            client: http_client(timeout)?,
            api_key,
            model,
            provider,
            timeout,
        })
    }

    /// Per-request timeout
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Which backend this instance talks to
    #[must_use]
    pub const fn provider(&self) -> SttProvider {
        self.provider
    }

    async fn transcribe_whisper(&self, audio: &[u8]) -> Result<String> {
        let file = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| Error::Transcription(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("model", self.model.clone());

        let request = self
            .client
            .post(WHISPER_URL)
            .bearer_auth(&self.api_key)
            .multipart(form);

        let result: WhisperResponse = send_json(request, "Whisper").await?;
        Ok(result.text)
    }

    async fn transcribe_deepgram(&self, audio: &[u8]) -> Result<String> {
        let request = self
            .client
            .post(DEEPGRAM_URL)
            .query(&[("model", self.model.as_str()), ("punctuate", "true")])
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", "audio/wav")
            .body(audio.to_vec());

        let result: DeepgramResponse = send_json(request, "Deepgram").await?;
        Ok(result.into_transcript())
    }
}

/// Send `request` and decode a JSON body, mapping every failure to `Transcription`
async fn send_json<T: DeserializeOwned>(request: reqwest::RequestBuilder, provider: &str) -> Result<T> {
    let response = request
        .send()
        .await
        .map_err(|e| Error::Transcription(format!("{provider} request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::error!(provider, status = %status, body = %body, "transcription rejected");
        return Err(Error::Transcription(format!("{provider} returned {status}: {body}")));
    }

    response
        .json()
        .await
        .map_err(|e| Error::Transcription(format!("invalid {provider} response: {e}")))
}

#[async_trait]
impl Transcriber for SpeechToText {
    async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), provider = ?self.provider, "transcribing");
        let transcript = match self.provider {
            SttProvider::Whisper => self.transcribe_whisper(audio).await?,
            SttProvider::Deepgram => self.transcribe_deepgram(audio).await?,
        };
        tracing::info!(transcript = %transcript, "transcription complete");
        Ok(transcript)
    }
}
