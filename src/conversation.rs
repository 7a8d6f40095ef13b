//! Conversation session over the history store
//!
//! A session binds one conversation identifier to an open store for the
//! length of a run. It guarantees the system message is the first entry and
//! is written exactly once, and commits each turn as a human message followed
//! by an AI message.

use crate::db::{HistoryStore, Message, MessageRole};
use crate::{Error, Result};

/// Process-local handle on one conversation
pub struct ConversationSession {
    id: String,
    store: Option<HistoryStore>,
}

impl ConversationSession {
    /// Open a conversation, writing the system message on first use
    ///
    /// When the conversation already has messages, `system_message` is
    /// ignored and the stored first message stays authoritative.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the store cannot be reached, or
    /// `WriteFailed` if the system message could not be committed
    pub fn open(store: HistoryStore, id: &str, system_message: &str) -> Result<Self> {
        store.ensure_conversation(id)?;

        if let Some(system) = store.append_first(id, MessageRole::System, system_message)? {
            tracing::info!(conversation = id, sequence = system.sequence, "conversation initialized");
        } else {
            let history = store.read_all(id)?;

            if let Some(first) = history.first()
                && first.text != system_message
            {
                tracing::debug!(
                    conversation = id,
                    "resuming with stored system message; supplied one ignored"
                );
            }

            if !starts_with_system(&history) {
                tracing::warn!(
                    conversation = id,
                    "conversation does not start with a system message"
                );
            }

            if history.last().is_some_and(|m| m.role == MessageRole::Human) {
                tracing::warn!(
                    conversation = id,
                    "conversation ends with an unanswered human message"
                );
            }

            tracing::info!(conversation = id, messages = history.len(), "conversation resumed");
        }

        Ok(Self {
            id: id.to_string(),
            store: Some(store),
        })
    }

    /// Conversation identifier
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether `close` has been called
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.store.is_none()
    }

    fn store(&self) -> Result<&HistoryStore> {
        self.store
            .as_ref()
            .ok_or_else(|| Error::StorageUnavailable(format!("session {} is closed", self.id)))
    }

    /// Commit one turn: the human message, then the AI message
    ///
    /// The two appends are separate. If the second fails the conversation
    /// keeps a trailing human message, see [`Self::has_unanswered_turn`].
    ///
    /// # Errors
    ///
    /// Returns `WriteFailed` if either message could not be committed
    pub fn record_turn(&self, human_text: &str, ai_text: &str) -> Result<(Message, Message)> {
        let store = self.store()?;

        let human = store.append(&self.id, MessageRole::Human, human_text)?;
        let ai = store
            .append(&self.id, MessageRole::Ai, ai_text)
            .inspect_err(|e| {
                tracing::warn!(
                    conversation = %self.id,
                    sequence = human.sequence,
                    error = %e,
                    "human message committed without reply"
                );
            })?;

        Ok((human, ai))
    }

    /// Committed messages in order
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the store cannot be read
    pub fn messages(&self) -> Result<Vec<Message>> {
        self.store()?.read_all(&self.id)
    }

    /// History rendered as `"<Role>: <text>"` lines, in sequence order
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the store cannot be read
    pub fn snapshot(&self) -> Result<Vec<String>> {
        Ok(self
            .messages()?
            .iter()
            .map(Message::transcript_line)
            .collect())
    }

    /// Highest committed sequence
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the store cannot be read
    pub fn last_sequence(&self) -> Result<Option<u64>> {
        self.store()?.last_sequence(&self.id)
    }

    /// Whether the last committed message is a human message with no reply
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the store cannot be read
    pub fn has_unanswered_turn(&self) -> Result<bool> {
        Ok(self
            .messages()?
            .last()
            .is_some_and(|m| m.role == MessageRole::Human))
    }

    /// Whether sequence 0 is a system message
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the store cannot be read
    pub fn starts_with_system_message(&self) -> Result<bool> {
        Ok(starts_with_system(&self.messages()?))
    }

    /// Release the store; later calls are no-ops
    pub fn close(&mut self) {
        if self.store.take().is_some() {
            tracing::debug!(conversation = %self.id, "session closed");
        }
    }
}

fn starts_with_system(history: &[Message]) -> bool {
    history.first().is_some_and(|m| m.role == MessageRole::System)
}
