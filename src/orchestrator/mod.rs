//! Turn orchestration
//!
//! Drives the conversation one turn at a time:
//!
//! ```text
//! Idle → Capturing → Transcribing → Generating → Committing → Synthesizing → Playing
//!            ▲                                                                  │
//!            └────────────────────── should_continue() ─────────────────────────┘
//! ```
//!
//! Any failure moves to `Terminated`. The turn is committed before it is
//! spoken, so a synthesis or playback failure never loses history.

mod collaborators;

use std::fmt;

use tracing::Instrument;
use uuid::Uuid;

use crate::Error;
use crate::conversation::ConversationSession;
use crate::db::Message;

pub use collaborators::{
    AudioSink, AudioSource, Collaborators, Generator, Synthesizer, Transcriber, TurnControl,
};

/// Orchestrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Capturing,
    Transcribing,
    Generating,
    Committing,
    Synthesizing,
    Playing,
    Terminated,
}

impl TurnState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Capturing => "capturing",
            Self::Transcribing => "transcribing",
            Self::Generating => "generating",
            Self::Committing => "committing",
            Self::Synthesizing => "synthesizing",
            Self::Playing => "playing",
            Self::Terminated => "terminated",
        }
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a run ended
#[derive(Debug)]
pub enum Termination {
    /// Control collaborator declined another turn
    Stopped,
    /// Transcription returned no text
    EmptyTranscription,
    /// Generation returned no text
    EmptyResponse,
    /// A stage failed
    Failed { state: TurnState, error: Error },
}

impl Termination {
    /// Whether the run ended because something went wrong
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        !matches!(self, Self::Stopped)
    }

    /// Stable name of the termination kind
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::EmptyTranscription => "empty_transcription",
            Self::EmptyResponse => "empty_response",
            Self::Failed { error, .. } => error.kind(),
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => f.write_str("stopped"),
            Self::EmptyTranscription => f.write_str("nothing was transcribed"),
            Self::EmptyResponse => f.write_str("model returned an empty response"),
            Self::Failed { state, error } => write!(f, "{error} (while {state})"),
        }
    }
}

/// A turn that reached the history store
#[derive(Debug, Clone)]
pub struct CommittedTurn {
    pub human: Message,
    pub ai: Message,
}

/// Summary of a finished run
#[derive(Debug)]
pub struct RunReport {
    pub conversation_id: String,
    pub turns_committed: usize,
    /// Last sequence known to be durable, for resuming
    pub last_sequence: Option<u64>,
    pub termination: Termination,
    /// Whether the session released the store before the report was built
    pub session_closed: bool,
}

/// Sequential turn loop over one conversation session
pub struct Orchestrator {
    session: ConversationSession,
    collaborators: Collaborators,
    state: TurnState,
    turns_committed: usize,
    last_sequence: Option<u64>,
}

impl Orchestrator {
    /// Create an orchestrator over an open session
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the session history cannot be read
    pub fn new(session: ConversationSession, collaborators: Collaborators) -> crate::Result<Self> {
        let last_sequence = session.last_sequence()?;
        Ok(Self {
            session,
            collaborators,
            state: TurnState::Idle,
            turns_committed: 0,
            last_sequence,
        })
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> TurnState {
        self.state
    }

    /// Underlying session
    #[must_use]
    pub const fn session(&self) -> &ConversationSession {
        &self.session
    }

    fn transition(&mut self, next: TurnState) {
        tracing::debug!(from = %self.state, to = %next, "state transition");
        self.state = next;
    }

    fn fail(&self, error: Error) -> Termination {
        let state = self.state;
        Termination::Failed {
            state,
            error: into_stage_error(state, error),
        }
    }

    /// Run a single turn, from capture to playback
    ///
    /// On success the state is left at `Playing`; the caller decides what
    /// comes next. A failure in `Synthesizing` or `Playing` happens after
    /// the turn was committed.
    ///
    /// # Errors
    ///
    /// Returns the termination reason when the turn cannot complete
    pub async fn run_turn(&mut self) -> Result<CommittedTurn, Termination> {
        self.transition(TurnState::Capturing);
        let audio = match self.collaborators.source.capture().await {
            Ok(audio) => audio,
            Err(e) => return Err(self.fail(e)),
        };
        tracing::debug!(audio_bytes = audio.len(), "input captured");

        self.transition(TurnState::Transcribing);
        let input = match self.collaborators.transcriber.transcribe(&audio).await {
            Ok(text) => text,
            Err(e) => return Err(self.fail(e)),
        };
        if input.trim().is_empty() {
            return Err(Termination::EmptyTranscription);
        }
        tracing::info!(input = %input, "transcribed");

        self.transition(TurnState::Generating);
        let context = match self.session.snapshot() {
            Ok(context) => context,
            Err(e) => return Err(self.fail(e)),
        };
        let response = match self.collaborators.generator.generate(&context, &input).await {
            Ok(text) => text,
            Err(e) => return Err(self.fail(e)),
        };
        if response.trim().is_empty() {
            return Err(Termination::EmptyResponse);
        }
        tracing::info!(response = %response, "response generated");

        self.transition(TurnState::Committing);
        let (human, ai) = match self.session.record_turn(&input, &response) {
            Ok(pair) => pair,
            Err(e) => return Err(self.fail(e)),
        };
        self.turns_committed += 1;
        self.last_sequence = Some(ai.sequence);
        tracing::info!(
            human_sequence = human.sequence,
            ai_sequence = ai.sequence,
            "turn committed"
        );

        self.transition(TurnState::Synthesizing);
        let speech = match self.collaborators.synthesizer.synthesize(&response).await {
            Ok(speech) => speech,
            Err(e) => return Err(self.fail(e)),
        };

        self.transition(TurnState::Playing);
        if let Err(e) = self.collaborators.sink.play(&speech).await {
            return Err(self.fail(e));
        }

        Ok(CommittedTurn { human, ai })
    }

    /// Run turns until the control collaborator stops or a stage fails
    ///
    /// The session is closed before returning.
    pub async fn run(mut self) -> RunReport {
        let span = tracing::info_span!(
            "conversation_run",
            run_id = %Uuid::new_v4(),
            conversation = %self.session.id(),
        );

        async move {
            tracing::info!(last_sequence = ?self.last_sequence, "conversation started");

            let termination = loop {
                match self.run_turn().await {
                    Ok(_) => {
                        if !self.collaborators.control.should_continue().await {
                            break Termination::Stopped;
                        }
                    }
                    Err(termination) => break termination,
                }
            };

            self.transition(TurnState::Terminated);

            // A turn can fail halfway through its commit
            if termination.is_failure()
                && let Ok(last) = self.session.last_sequence()
            {
                self.last_sequence = last;
            }
            self.session.close();

            if termination.is_failure() {
                tracing::error!(
                    kind = termination.kind(),
                    last_sequence = ?self.last_sequence,
                    "conversation terminated: {termination}"
                );
            } else {
                tracing::info!(turns = self.turns_committed, "conversation ended");
            }

            RunReport {
                conversation_id: self.session.id().to_string(),
                turns_committed: self.turns_committed,
                last_sequence: self.last_sequence,
                termination,
                session_closed: self.session.is_closed(),
            }
        }
        .instrument(span)
        .await
    }
}

/// Tag a collaborator error with the kind owned by the failing stage
fn into_stage_error(state: TurnState, error: Error) -> Error {
    let wrap: fn(String) -> Error = match state {
        TurnState::Capturing => Error::Capture,
        TurnState::Transcribing => Error::Transcription,
        TurnState::Generating => Error::Generation,
        TurnState::Synthesizing => Error::Synthesis,
        TurnState::Playing => Error::Playback,
        TurnState::Idle | TurnState::Committing | TurnState::Terminated => return error,
    };

    let typed = matches!(
        (state, &error),
        (TurnState::Capturing, Error::Capture(_))
            | (TurnState::Transcribing, Error::Transcription(_))
            | (TurnState::Generating, Error::Generation(_))
            | (TurnState::Synthesizing, Error::Synthesis(_))
            | (TurnState::Playing, Error::Playback(_))
    );

    // Store errors keep their own kind
    let storage = matches!(
        error,
        Error::StorageUnavailable(_) | Error::WriteFailed(_)
    );

    if typed || storage {
        error
    } else {
        wrap(error.to_string())
    }
}
