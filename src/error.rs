//! Error types for murmur

use thiserror::Error;

/// Result type alias for murmur operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running a conversation
#[derive(Debug, Error)]
pub enum Error {
    /// History store cannot be reached or created
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A message append did not take effect
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// Conversation identifier is unusable
    #[error("invalid conversation id: {0:?}")]
    InvalidConversationId(String),

    /// Audio capture error
    #[error("capture error: {0}")]
    Capture(String),

    /// Speech-to-text error
    #[error("transcription error: {0}")]
    Transcription(String),

    /// Language model error
    #[error("generation error: {0}")]
    Generation(String),

    /// Text-to-speech error
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Audio playback error
    #[error("playback error: {0}")]
    Playback(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Stable name of the failure kind, used in the exit report
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::StorageUnavailable(_) => "storage_unavailable",
            Self::WriteFailed(_) => "write_failed",
            Self::InvalidConversationId(_) => "invalid_conversation_id",
            Self::Capture(_) => "capture",
            Self::Transcription(_) => "transcription",
            Self::Generation(_) => "generation",
            Self::Synthesis(_) => "synthesis",
            Self::Playback(_) => "playback",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Http(_) => "http",
            Self::Serialization(_) => "serialization",
            Self::Toml(_) => "toml",
        }
    }

    /// Whether the caller may retry the failed operation
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::WriteFailed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(
            Error::StorageUnavailable("x".into()).kind(),
            "storage_unavailable"
        );
        assert_eq!(Error::Playback("x".into()).kind(), "playback");
    }

    #[test]
    fn test_only_write_failures_are_retryable() {
        assert!(Error::WriteFailed("busy".into()).is_retryable());
        assert!(!Error::StorageUnavailable("gone".into()).is_retryable());
        assert!(!Error::Generation("timeout".into()).is_retryable());
    }
}
