//! Append-only conversation history

use std::fmt;

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, TransactionBehavior, params};

use super::{DbConn, DbPool};
use crate::{Error, Result};

/// Longest accepted conversation identifier
const MAX_CONVERSATION_ID_LEN: usize = 128;

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageRole {
    System,
    Human,
    Ai,
}

impl MessageRole {
    /// Storage representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Human => "human",
            Self::Ai => "ai",
        }
    }

    /// Capitalized speaker label used in transcripts
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::System => "System",
            Self::Human => "Human",
            Self::Ai => "AI",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "system" => Some(Self::System),
            "human" => Some(Self::Human),
            "ai" => Some(Self::Ai),
            _ => None,
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A committed message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub conversation_id: String,
    /// Authoritative position within the conversation, starting at 0
    pub sequence: u64,
    pub role: MessageRole,
    pub text: String,
    /// Display only; ordering uses `sequence`
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Render as `"<Role>: <text>"`
    #[must_use]
    pub fn transcript_line(&self) -> String {
        format!("{}: {}", self.role.label(), self.text)
    }
}

/// Overview of a stored conversation
#[derive(Debug, Clone)]
pub struct ConversationSummary {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub message_count: usize,
}

/// Durable, ordered message log keyed by conversation identifier
#[derive(Clone)]
pub struct HistoryStore {
    pool: DbPool,
}

impl HistoryStore {
    /// Create a store over an initialized pool
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<DbConn> {
        self.pool
            .get()
            .map_err(|e| Error::StorageUnavailable(e.to_string()))
    }

    /// Create the conversation if it does not exist yet
    ///
    /// Existing conversations are left untouched.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the database cannot be reached
    pub fn ensure_conversation(&self, id: &str) -> Result<()> {
        validate_id(id)?;
        let conn = self.conn()?;

        let created = conn
            .execute(
                "INSERT OR IGNORE INTO conversations (id, created_at) VALUES (?1, ?2)",
                params![id, Utc::now().to_rfc3339()],
            )
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;

        if created > 0 {
            tracing::info!(conversation = id, "conversation created");
        }
        Ok(())
    }

    /// Append a message at the next sequence number
    ///
    /// Sequence assignment and insert happen in one immediate transaction,
    /// so concurrent writers never share a sequence. On error nothing is
    /// written.
    ///
    /// # Errors
    ///
    /// Returns `WriteFailed` if the message could not be committed
    pub fn append(&self, id: &str, role: MessageRole, text: &str) -> Result<Message> {
        self.append_inner(id, role, text, false)?
            .ok_or_else(|| Error::WriteFailed("append skipped".to_string()))
    }

    /// Append a message only if the conversation has no messages yet
    ///
    /// Returns `None` when the conversation already has content. The
    /// emptiness check and the insert share one transaction, so two
    /// callers racing on a fresh conversation write a single message.
    ///
    /// # Errors
    ///
    /// Returns `WriteFailed` if the message could not be committed
    pub fn append_first(&self, id: &str, role: MessageRole, text: &str) -> Result<Option<Message>> {
        self.append_inner(id, role, text, true)
    }

    fn append_inner(
        &self,
        id: &str,
        role: MessageRole,
        text: &str,
        only_if_empty: bool,
    ) -> Result<Option<Message>> {
        validate_id(id)?;
        let mut conn = self
            .pool
            .get()
            .map_err(|e| Error::WriteFailed(e.to_string()))?;

        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(write_failed)?;

        tx.execute(
            "INSERT OR IGNORE INTO conversations (id, created_at) VALUES (?1, ?2)",
            params![id, Utc::now().to_rfc3339()],
        )
        .map_err(write_failed)?;

        let next: i64 = tx
            .query_row(
                "SELECT COALESCE(MAX(sequence) + 1, 0) FROM messages WHERE conversation_id = ?1",
                [id],
                |row| row.get(0),
            )
            .map_err(write_failed)?;

        if only_if_empty && next > 0 {
            return Ok(None);
        }

        let sequence = u64::try_from(next)
            .map_err(|_| Error::WriteFailed(format!("invalid next sequence {next}")))?;

        let created_at = Utc::now();
        tx.execute(
            "INSERT INTO messages (conversation_id, sequence, role, text, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, next, role.as_str(), text, created_at.to_rfc3339()],
        )
        .map_err(write_failed)?;

        tx.commit().map_err(write_failed)?;

        tracing::debug!(conversation = id, %role, sequence, "message committed");

        Ok(Some(Message {
            conversation_id: id.to_string(),
            sequence,
            role,
            text: text.to_string(),
            created_at,
        }))
    }

    /// All messages of a conversation in ascending sequence order
    ///
    /// Unknown conversations yield an empty list.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the database cannot be read
    pub fn read_all(&self, id: &str) -> Result<Vec<Message>> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(
                "SELECT conversation_id, sequence, role, text, created_at
                 FROM messages WHERE conversation_id = ?1
                 ORDER BY sequence ASC",
            )
            .map_err(unavailable)?;

        let messages = stmt
            .query_map([id], |row| {
                let role: String = row.get(2)?;
                let sequence: i64 = row.get(1)?;
                Ok(Message {
                    conversation_id: row.get(0)?,
                    sequence: u64::try_from(sequence).map_err(|_| {
                        rusqlite::Error::IntegralValueOutOfRange(1, sequence)
                    })?,
                    role: MessageRole::parse(&role).ok_or_else(|| {
                        rusqlite::Error::InvalidColumnType(
                            2,
                            "role".to_string(),
                            rusqlite::types::Type::Text,
                        )
                    })?,
                    text: row.get(3)?,
                    created_at: parse_datetime(&row.get::<_, String>(4)?),
                })
            })
            .map_err(unavailable)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(unavailable)?;

        Ok(messages)
    }

    /// Number of committed messages
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the database cannot be read
    pub fn count(&self, id: &str) -> Result<usize> {
        let conn = self.conn()?;

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
                [id],
                |row| row.get(0),
            )
            .map_err(unavailable)?;

        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Highest committed sequence, if any message exists
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the database cannot be read
    pub fn last_sequence(&self, id: &str) -> Result<Option<u64>> {
        let conn = self.conn()?;

        let max: Option<i64> = conn
            .query_row(
                "SELECT MAX(sequence) FROM messages WHERE conversation_id = ?1",
                [id],
                |row| row.get(0),
            )
            .optional()
            .map_err(unavailable)?
            .flatten();

        Ok(max.and_then(|s| u64::try_from(s).ok()))
    }

    /// List stored conversations ordered by identifier
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the database cannot be read
    pub fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(
                "SELECT c.id, c.created_at, COUNT(m.sequence)
                 FROM conversations c
                 LEFT JOIN messages m ON m.conversation_id = c.id
                 GROUP BY c.id
                 ORDER BY c.id",
            )
            .map_err(unavailable)?;

        let summaries = stmt
            .query_map([], |row| {
                let count: i64 = row.get(2)?;
                Ok(ConversationSummary {
                    id: row.get(0)?,
                    created_at: parse_datetime(&row.get::<_, String>(1)?),
                    message_count: usize::try_from(count).unwrap_or(0),
                })
            })
            .map_err(unavailable)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(unavailable)?;

        Ok(summaries)
    }
}

fn validate_id(id: &str) -> Result<()> {
    if id.trim().is_empty()
        || id.len() > MAX_CONVERSATION_ID_LEN
        || id.chars().any(char::is_control)
    {
        return Err(Error::InvalidConversationId(id.to_string()));
    }
    Ok(())
}

fn unavailable(e: rusqlite::Error) -> Error {
    Error::StorageUnavailable(e.to_string())
}

fn write_failed(e: rusqlite::Error) -> Error {
    Error::WriteFailed(e.to_string())
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
