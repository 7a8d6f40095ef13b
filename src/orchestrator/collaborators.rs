//! Contracts the orchestrator needs from its external collaborators
//!
//! Each call either returns a value or a typed error. Timeouts and retries
//! belong to the implementation, not to the orchestrator.

use async_trait::async_trait;

use crate::Result;

/// Produces one utterance of input audio
#[async_trait]
pub trait AudioSource: Send + Sync {
    /// Record input audio
    async fn capture(&self) -> Result<Vec<u8>>;
}

/// Plays output audio
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Play encoded audio to completion
    async fn play(&self, audio: &[u8]) -> Result<()>;
}

/// Speech-to-text backend
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe audio; an empty string means nothing was heard
    async fn transcribe(&self, audio: &[u8]) -> Result<String>;
}

/// Language model backend
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a reply given the rendered history and the new input
    async fn generate(&self, context: &[String], input: &str) -> Result<String>;
}

/// Text-to-speech backend
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize text into encoded audio
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

/// Decides whether another turn follows
#[async_trait]
pub trait TurnControl: Send + Sync {
    /// `false` ends the run; implementations answer `false` when unsure
    async fn should_continue(&self) -> bool;
}

/// The full set of collaborators one run needs
pub struct Collaborators {
    pub source: Box<dyn AudioSource>,
    pub sink: Box<dyn AudioSink>,
    pub transcriber: Box<dyn Transcriber>,
    pub generator: Box<dyn Generator>,
    pub synthesizer: Box<dyn Synthesizer>,
    pub control: Box<dyn TurnControl>,
}
