//! Reply generation through an Ollama server

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::orchestrator::Generator;
use crate::{Error, Result};

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Join rendered history and the new input into one prompt
///
/// Each history line is kept verbatim and the input is appended as a
/// `Human:` line.
#[must_use]
pub fn build_prompt(context: &[String], input: &str) -> String {
    let human = format!("Human: {input}");
    let mut lines: Vec<&str> = context.iter().map(String::as_str).collect();
    lines.push(&human);
    lines.join("\n")
}

/// Generates replies with `POST <base>/api/generate`
pub struct OllamaGenerator {
    client: reqwest::Client,
    endpoint: Url,
    model: String,
}

impl OllamaGenerator {
    /// Create a generator for `model` served at `base_url`
    ///
    /// # Errors
    ///
    /// Returns `Config` if the URL is invalid or the model is empty
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        if model.trim().is_empty() {
            return Err(Error::Config("LLM model must not be empty".to_string()));
        }

        let mut endpoint = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("invalid LLM URL {base_url}: {e}")))?;
        let path = format!("{}/api/generate", endpoint.path().trim_end_matches('/'));
        endpoint.set_path(&path);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            model: model.to_string(),
        })
    }

    /// Full URL requests are sent to
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, context: &[String], input: &str) -> Result<String> {
        let prompt = build_prompt(context, input);
        tracing::debug!(model = %self.model, prompt_chars = prompt.len(), "generating response");

        let request = GenerateRequest {
            model: &self.model,
            prompt: &prompt,
            stream: false,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "LLM request failed");
                Error::Generation(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "LLM API error");
            return Err(Error::Generation(format!("Ollama error {status}: {body}")));
        }

        let result: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::Generation(format!("invalid Ollama response: {e}")))?;

        tracing::debug!(response_len = result.response.len(), "LLM responded");
        Ok(result.response)
    }
}
