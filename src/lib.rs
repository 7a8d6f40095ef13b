//! Murmur - Voice conversation loop with durable history
//!
//! This library provides the core of the murmur assistant:
//! - Conversation history in SQLite, append-only and strictly ordered
//! - A session handle that seeds and resumes conversations
//! - A turn orchestrator driving capture, STT, LLM, TTS and playback
//! - Concrete voice and model adapters behind small traits
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   Orchestrator                       │
//! │  Capture → STT → Generate → Commit → TTS → Playback  │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │               Conversation Session                   │
//! │        open  │  record_turn  │  snapshot             │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                 History Store                        │
//! │          SQLite (r2d2 pool, append-only)             │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod control;
pub mod conversation;
pub mod db;
pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod pipeline;
pub mod voice;

pub use config::Config;
pub use conversation::ConversationSession;
pub use db::{ConversationSummary, DbConn, DbPool, HistoryStore, Message, MessageRole};
pub use error::{Error, Result};
pub use orchestrator::{Collaborators, Orchestrator, RunReport, Termination, TurnState};
