//! Wiring from a resolved [`Config`] to a ready-to-run conversation

use crate::config::Config;
use crate::conversation::ConversationSession;
use crate::db::{self, HistoryStore};
use crate::llm::OllamaGenerator;
use crate::orchestrator::{Collaborators, Orchestrator, Synthesizer, Transcriber, TurnControl};
use crate::voice::{MicrophoneSource, SpeakerSink, SpeechToText, SttProvider, TextToSpeech, TtsProvider};
use crate::{Error, Result};

/// Open the history database named by `config`
///
/// # Errors
///
/// Returns `StorageUnavailable` if the database cannot be opened
pub fn open_store(config: &Config) -> Result<HistoryStore> {
    let pool = db::init(&config.database_path)?;
    Ok(HistoryStore::new(pool))
}

/// Open the configured conversation, creating it on first use
///
/// # Errors
///
/// Returns `StorageUnavailable` if the store cannot be reached
pub fn open_session(config: &Config, store: HistoryStore) -> Result<ConversationSession> {
    ConversationSession::open(store, &config.conversation_id, &config.system_message)
}

/// Build the speech-to-text adapter for the configured provider
///
/// # Errors
///
/// Returns `Config` if the provider's API key is missing
pub fn build_transcriber(config: &Config) -> Result<Box<dyn Transcriber>> {
    let voice = &config.voice;
    let key = match voice.stt_provider {
        SttProvider::Whisper => require_key(config.api_keys.openai.as_deref(), "OPENAI_API_KEY")?,
        SttProvider::Deepgram => {
            require_key(config.api_keys.deepgram.as_deref(), "DEEPGRAM_API_KEY")?
        }
    };
    Ok(Box::new(SpeechToText::new(
        voice.stt_provider,
        key,
        voice.stt_model.clone(),
        voice.stt_timeout,
    )?))
}

/// Build the text-to-speech adapter for the configured provider
///
/// # Errors
///
/// Returns `Config` if the provider's API key is missing or a setting is invalid
pub fn build_synthesizer(config: &Config) -> Result<Box<dyn Synthesizer>> {
    let voice = &config.voice;
    let tts = match voice.tts_provider {
        TtsProvider::OpenAI => TextToSpeech::new_openai(
            require_key(config.api_keys.openai.as_deref(), "OPENAI_API_KEY")?,
            voice.tts_voice.clone(),
            voice.tts_speed,
            voice.tts_model.clone(),
            voice.tts_timeout,
        )?,
        TtsProvider::ElevenLabs => TextToSpeech::new_elevenlabs(
            require_key(config.api_keys.elevenlabs.as_deref(), "ELEVENLABS_API_KEY")?,
            voice.tts_voice.clone(),
            voice.tts_model.clone(),
            voice.tts_timeout,
        )?,
    };
    Ok(Box::new(tts))
}

/// Build every collaborator of a voice run
///
/// # Errors
///
/// Returns `Config` if any adapter cannot be configured
pub fn build_collaborators(config: &Config, control: Box<dyn TurnControl>) -> Result<Collaborators> {
    let voice = &config.voice;
    Ok(Collaborators {
        source: Box::new(
            MicrophoneSource::new(voice.record_duration)
                .with_save_path(voice.input_audio_file.clone()),
        ),
        sink: Box::new(SpeakerSink::new().with_save_path(voice.output_audio_file.clone())),
        transcriber: build_transcriber(config)?,
        generator: Box::new(OllamaGenerator::new(
            &config.llm.base_url,
            &config.llm.model,
            config.llm.timeout,
        )?),
        synthesizer: build_synthesizer(config)?,
        control,
    })
}

/// Open storage and the conversation, then assemble the orchestrator
///
/// Collaborators are built before storage is touched so a bad provider
/// setting never creates an empty conversation.
///
/// # Errors
///
/// Returns `Config` for adapter problems or `StorageUnavailable` for storage
pub fn build_orchestrator(config: &Config, control: Box<dyn TurnControl>) -> Result<Orchestrator> {
    let collaborators = build_collaborators(config, control)?;
    let store = open_store(config)?;
    let session = open_session(config, store)?;
    Orchestrator::new(session, collaborators)
}

fn require_key(key: Option<&str>, name: &str) -> Result<String> {
    key.filter(|k| !k.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::Config(format!("{name} is not set")))
}
