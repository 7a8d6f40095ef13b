//! Configuration management for murmur
//!
//! Values resolve as environment > TOML file > built-in default.

pub mod file;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::voice::{SttProvider, TtsProvider};
use crate::{Error, Result};

use file::MurmurConfigFile;

/// Conversation used when none is configured
pub const DEFAULT_CONVERSATION: &str = "default";

/// System message for new conversations
pub const DEFAULT_SYSTEM_MESSAGE: &str = "You are a helpful assistant.";

/// murmur configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Conversation to open
    pub conversation_id: String,

    /// System message for a fresh conversation
    pub system_message: String,

    /// SQLite database holding conversation history
    pub database_path: PathBuf,

    /// Reply generation
    pub llm: LlmConfig,

    /// Voice processing
    pub voice: VoiceConfig,

    /// API keys
    pub api_keys: ApiKeys,
}

/// Ollama settings
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Length of each recording
    pub record_duration: Duration,

    pub stt_provider: SttProvider,

    /// STT model (e.g. "whisper-1", "nova-2")
    pub stt_model: String,

    /// Limit on one transcription request
    pub stt_timeout: Duration,

    pub tts_provider: TtsProvider,

    /// TTS model (e.g. "tts-1", "eleven_monolingual_v1")
    pub tts_model: String,

    /// TTS voice identifier
    pub tts_voice: String,

    /// TTS speed multiplier (0.25 to 4.0)
    pub tts_speed: f32,

    /// Limit on one synthesis request
    pub tts_timeout: Duration,

    /// Keep a copy of each recording here
    pub input_audio_file: Option<PathBuf>,

    /// Keep a copy of each synthesized reply here
    pub output_audio_file: Option<PathBuf>,
}

/// API keys for external services
#[derive(Clone, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (for Whisper and TTS)
    pub openai: Option<String>,

    /// `Deepgram` API key (optional STT)
    pub deepgram: Option<String>,

    /// `ElevenLabs` API key (optional TTS)
    pub elevenlabs: Option<String>,
}

impl fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |k: &Option<String>| k.as_ref().map(|_| "<redacted>");
        f.debug_struct("ApiKeys")
            .field("openai", &mask(&self.openai))
            .field("deepgram", &mask(&self.deepgram))
            .field("elevenlabs", &mask(&self.elevenlabs))
            .finish()
    }
}

/// Default database location: `~/.local/share/murmur/murmur.db` on Linux
#[must_use]
pub fn default_database_path() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from("murmur.db"),
        |d| d.data_dir().join("murmur").join("murmur.db"),
    )
}

impl Config {
    /// Load configuration from the process environment and config file
    ///
    /// # Errors
    ///
    /// Returns error if the config file or a value is invalid
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let fc = file::load_config_file(config_path)?;
        Self::resolve(fc, |key| std::env::var(key).ok())
    }

    /// Resolve configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns `Config` if a resolved value is invalid
    pub fn resolve<F>(fc: MurmurConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let conversation_id = env("MURMUR_CONVERSATION")
            .or(fc.conversation.id)
            .unwrap_or_else(|| DEFAULT_CONVERSATION.to_string());
        let system_message = env("MURMUR_SYSTEM_MESSAGE")
            .or(fc.conversation.system_message)
            .unwrap_or_else(|| DEFAULT_SYSTEM_MESSAGE.to_string());
        let database_path = env("MURMUR_DATABASE")
            .map(PathBuf::from)
            .or(fc.storage.database)
            .unwrap_or_else(default_database_path);

        let llm = LlmConfig {
            base_url: env("MURMUR_LLM_URL")
                .or(fc.llm.base_url)
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            model: env("MURMUR_LLM_MODEL")
                .or(fc.llm.model)
                .unwrap_or_else(|| "llama3.2".to_string()),
            timeout: positive_secs(
                parse_env(&env, "MURMUR_LLM_TIMEOUT").or(fc.llm.timeout_secs),
                120,
                "llm.timeout_secs",
            )?,
        };

        let record_seconds: u64 = parse_env(&env, "MURMUR_RECORD_SECONDS")
            .or(fc.voice.record_seconds)
            .unwrap_or(5);
        if record_seconds == 0 {
            return Err(Error::Config(
                "voice.record_seconds must be at least 1".to_string(),
            ));
        }

        let stt_timeout = positive_secs(
            parse_env(&env, "MURMUR_STT_TIMEOUT").or(fc.voice.stt_timeout_secs),
            30,
            "voice.stt_timeout_secs",
        )?;
        let tts_timeout = positive_secs(
            parse_env(&env, "MURMUR_TTS_TIMEOUT").or(fc.voice.tts_timeout_secs),
            30,
            "voice.tts_timeout_secs",
        )?;

        let stt_provider = SttProvider::parse(
            &env("MURMUR_STT_PROVIDER")
                .or(fc.voice.stt_provider)
                .unwrap_or_else(|| "whisper".to_string()),
        )?;
        let tts_provider = TtsProvider::parse(
            &env("MURMUR_TTS_PROVIDER")
                .or(fc.voice.tts_provider)
                .unwrap_or_else(|| "openai".to_string()),
        )?;

        let voice = VoiceConfig {
            record_duration: Duration::from_secs(record_seconds),
            stt_provider,
            stt_model: env("MURMUR_STT_MODEL")
                .or(fc.voice.stt_model)
                .unwrap_or_else(|| default_stt_model(stt_provider).to_string()),
            stt_timeout,
            tts_provider,
            tts_model: env("MURMUR_TTS_MODEL")
                .or(fc.voice.tts_model)
                .unwrap_or_else(|| default_tts_model(tts_provider).to_string()),
            tts_voice: env("MURMUR_TTS_VOICE")
                .or(fc.voice.tts_voice)
                .unwrap_or_else(|| default_tts_voice(tts_provider).to_string()),
            tts_speed: parse_env(&env, "MURMUR_TTS_SPEED")
                .or(fc.voice.tts_speed)
                .unwrap_or(1.0),
            tts_timeout,
            input_audio_file: env("MURMUR_INPUT_AUDIO_FILE")
                .map(PathBuf::from)
                .or(fc.voice.input_audio_file),
            output_audio_file: env("MURMUR_OUTPUT_AUDIO_FILE")
                .map(PathBuf::from)
                .or(fc.voice.output_audio_file),
        };

        let api_keys = ApiKeys {
            openai: env("OPENAI_API_KEY").or(fc.api_keys.openai),
            deepgram: env("DEEPGRAM_API_KEY").or(fc.api_keys.deepgram),
            elevenlabs: env("ELEVENLABS_API_KEY").or(fc.api_keys.elevenlabs),
        };

        Ok(Self {
            conversation_id,
            system_message,
            database_path,
            llm,
            voice,
            api_keys,
        })
    }
}

const fn default_stt_model(provider: SttProvider) -> &'static str {
    match provider {
        SttProvider::Whisper => "whisper-1",
        SttProvider::Deepgram => "nova-2",
    }
}

const fn default_tts_model(provider: TtsProvider) -> &'static str {
    match provider {
        TtsProvider::OpenAI => "tts-1",
        TtsProvider::ElevenLabs => "eleven_monolingual_v1",
    }
}

const fn default_tts_voice(provider: TtsProvider) -> &'static str {
    match provider {
        TtsProvider::OpenAI => "alloy",
        // ElevenLabs "Rachel"
        TtsProvider::ElevenLabs => "21m00Tcm4TlvDq8ikWAM",
    }
}

fn positive_secs(value: Option<u64>, default: u64, key: &str) -> Result<Duration> {
    match value.unwrap_or(default) {
        0 => Err(Error::Config(format!("{key} must be at least 1"))),
        secs => Ok(Duration::from_secs(secs)),
    }
}

/// Parse a numeric env value, ignoring it with a warning when malformed
fn parse_env<T, F>(env: &F, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let raw = env(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, value = %raw, error = %e, "ignoring invalid environment value");
            None
        }
    }
}
