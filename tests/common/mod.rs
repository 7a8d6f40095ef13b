//! Shared test utilities

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use murmur::orchestrator::{
    AudioSink, AudioSource, Collaborators, Generator, Synthesizer, Transcriber, TurnControl,
};
use murmur::{ConversationSession, DbPool, Error, HistoryStore, Result, db};

/// Set up an in-memory test database
#[must_use]
pub fn setup_test_db() -> DbPool {
    db::init_memory().expect("failed to init test db")
}

/// Open a session over a fresh in-memory store
pub fn open_test_session(id: &str, system_message: &str) -> (HistoryStore, ConversationSession) {
    let store = HistoryStore::new(setup_test_db());
    let session = ConversationSession::open(store.clone(), id, system_message)
        .expect("failed to open test session");
    (store, session)
}

/// What the fake collaborators return, indexed by call number
#[derive(Default)]
pub struct Script {
    pub transcripts: Vec<&'static str>,
    pub replies: Vec<&'static str>,
    pub continues: Vec<bool>,
    pub fail_capture_at: Option<usize>,
    pub fail_transcribe_at: Option<usize>,
    pub fail_generate_at: Option<usize>,
    pub fail_synthesize_at: Option<usize>,
    pub fail_play_at: Option<usize>,
}

#[derive(Default)]
struct Shared {
    script: Script,
    calls: Mutex<Vec<&'static str>>,
    contexts: Mutex<Vec<Vec<String>>>,
    inputs: Mutex<Vec<String>>,
    spoken: Mutex<Vec<String>>,
    committed_at_synthesis: Mutex<Vec<usize>>,
    observer: Option<(HistoryStore, String)>,
}

impl Shared {
    /// Log a call and return how many earlier calls the stage had
    fn record(&self, stage: &'static str) -> usize {
        let mut calls = self.calls.lock().unwrap();
        let n = calls.iter().filter(|c| **c == stage).count();
        calls.push(stage);
        n
    }
}

/// Scripted stand-ins for every collaborator, sharing one call log
#[derive(Clone)]
pub struct Harness {
    shared: Arc<Shared>,
}

impl Harness {
    pub fn new(script: Script) -> Self {
        Self {
            shared: Arc::new(Shared {
                script,
                ..Shared::default()
            }),
        }
    }

    /// Record the stored message count of `id` whenever synthesis starts
    pub fn observing(script: Script, store: HistoryStore, id: &str) -> Self {
        Self {
            shared: Arc::new(Shared {
                script,
                observer: Some((store, id.to_string())),
                ..Shared::default()
            }),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            source: Box::new(self.clone()),
            sink: Box::new(self.clone()),
            transcriber: Box::new(self.clone()),
            generator: Box::new(self.clone()),
            synthesizer: Box::new(self.clone()),
            control: Box::new(self.clone()),
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.shared.calls.lock().unwrap().clone()
    }

    pub fn count(&self, stage: &str) -> usize {
        self.calls().iter().filter(|c| **c == stage).count()
    }

    /// Context lines handed to the generator, one entry per call
    pub fn contexts(&self) -> Vec<Vec<String>> {
        self.shared.contexts.lock().unwrap().clone()
    }

    /// Inputs handed to the generator
    pub fn inputs(&self) -> Vec<String> {
        self.shared.inputs.lock().unwrap().clone()
    }

    /// Texts handed to the synthesizer
    pub fn spoken(&self) -> Vec<String> {
        self.shared.spoken.lock().unwrap().clone()
    }

    pub fn committed_at_synthesis(&self) -> Vec<usize> {
        self.shared.committed_at_synthesis.lock().unwrap().clone()
    }
}

#[async_trait]
impl AudioSource for Harness {
    async fn capture(&self) -> Result<Vec<u8>> {
        let n = self.shared.record("capture");
        if self.shared.script.fail_capture_at == Some(n) {
            return Err(Error::Capture("no input device".to_string()));
        }
        Ok(b"RIFF".to_vec())
    }
}

#[async_trait]
impl Transcriber for Harness {
    async fn transcribe(&self, _audio: &[u8]) -> Result<String> {
        let n = self.shared.record("transcribe");
        if self.shared.script.fail_transcribe_at == Some(n) {
            return Err(Error::Io(std::io::Error::other("connection reset")));
        }
        Ok(self
            .shared
            .script
            .transcripts
            .get(n)
            .copied()
            .unwrap_or_default()
            .to_string())
    }
}

#[async_trait]
impl Generator for Harness {
    async fn generate(&self, context: &[String], input: &str) -> Result<String> {
        let n = self.shared.record("generate");
        self.shared.contexts.lock().unwrap().push(context.to_vec());
        self.shared.inputs.lock().unwrap().push(input.to_string());
        if self.shared.script.fail_generate_at == Some(n) {
            return Err(Error::Generation("model not loaded".to_string()));
        }
        Ok(self
            .shared
            .script
            .replies
            .get(n)
            .copied()
            .unwrap_or_default()
            .to_string())
    }
}

#[async_trait]
impl Synthesizer for Harness {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let n = self.shared.record("synthesize");
        self.shared.spoken.lock().unwrap().push(text.to_string());
        if let Some((store, id)) = &self.shared.observer {
            let count = store.count(id).expect("observer count");
            self.shared.committed_at_synthesis.lock().unwrap().push(count);
        }
        if self.shared.script.fail_synthesize_at == Some(n) {
            return Err(Error::Synthesis("voice not found".to_string()));
        }
        Ok(vec![0x49, 0x44, 0x33])
    }
}

#[async_trait]
impl AudioSink for Harness {
    async fn play(&self, _audio: &[u8]) -> Result<()> {
        let n = self.shared.record("play");
        if self.shared.script.fail_play_at == Some(n) {
            return Err(Error::Playback("device busy".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TurnControl for Harness {
    async fn should_continue(&self) -> bool {
        let n = self.shared.record("continue");
        self.shared.script.continues.get(n).copied().unwrap_or(false)
    }
}
