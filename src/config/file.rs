//! TOML configuration file loading
//!
//! Supports `~/.config/murmur/config.toml` as a persistent config source.
//! Every field is optional; the file overlays the built-in defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, Result};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MurmurConfigFile {
    /// Conversation selection
    #[serde(default)]
    pub conversation: ConversationFileConfig,

    /// History storage
    #[serde(default)]
    pub storage: StorageFileConfig,

    /// LLM configuration
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Voice/audio configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// Which conversation to open and how to seed it
#[derive(Debug, Default, Deserialize)]
pub struct ConversationFileConfig {
    /// Conversation identifier
    pub id: Option<String>,

    /// System message written when the conversation is first created
    pub system_message: Option<String>,
}

/// History storage configuration
#[derive(Debug, Default, Deserialize)]
pub struct StorageFileConfig {
    /// Path to the SQLite database
    pub database: Option<PathBuf>,
}

/// LLM-related configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Ollama base URL (e.g. "http://localhost:11434")
    pub base_url: Option<String>,

    /// Model identifier (e.g. "llama3.2")
    pub model: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Length of each recording
    pub record_seconds: Option<u64>,

    /// STT provider ("whisper" or "deepgram")
    pub stt_provider: Option<String>,

    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// STT request timeout in seconds
    pub stt_timeout_secs: Option<u64>,

    /// TTS provider ("openai" or "elevenlabs")
    pub tts_provider: Option<String>,

    /// TTS model (e.g. "tts-1")
    pub tts_model: Option<String>,

    /// TTS voice identifier (e.g. "alloy")
    pub tts_voice: Option<String>,

    /// TTS speed multiplier
    pub tts_speed: Option<f32>,

    /// TTS request timeout in seconds
    pub tts_timeout_secs: Option<u64>,

    /// Where to keep the last recording
    pub input_audio_file: Option<PathBuf>,

    /// Where to keep the last synthesized reply
    pub output_audio_file: Option<PathBuf>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub deepgram: Option<String>,
    pub elevenlabs: Option<String>,
}

/// Parse config file contents
///
/// # Errors
///
/// Returns error if the TOML is malformed or has unknown keys
pub fn parse_config(content: &str) -> Result<MurmurConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Load the TOML config file
///
/// An explicit `path` must exist and parse. Without one, the standard path
/// is tried and any problem falls back to `MurmurConfigFile::default()`.
///
/// # Errors
///
/// Returns error only for an explicit path that cannot be read or parsed
pub fn load_config_file(path: Option<&Path>) -> Result<MurmurConfigFile> {
    if let Some(path) = path {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        let config = parse_config(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        tracing::info!(path = %path.display(), "loaded config file");
        return Ok(config);
    }

    let Some(path) = config_file_path() else {
        return Ok(MurmurConfigFile::default());
    };

    if !path.exists() {
        return Ok(MurmurConfigFile::default());
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match parse_config(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                Ok(config)
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                Ok(MurmurConfigFile::default())
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            Ok(MurmurConfigFile::default())
        }
    }
}

/// Return the config file path: `~/.config/murmur/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("murmur").join("config.toml"))
}
