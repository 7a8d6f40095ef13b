//! Continue/stop decisions between turns

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dialoguer::Confirm;

use crate::orchestrator::TurnControl;

/// Asks the operator on the terminal after every turn
#[derive(Debug, Default)]
pub struct PromptControl;

#[async_trait]
impl TurnControl for PromptControl {
    async fn should_continue(&self) -> bool {
        let answer = tokio::task::spawn_blocking(|| {
            Confirm::new()
                .with_prompt("Do you want to continue the conversation?")
                .default(false)
                .interact()
        })
        .await;

        match answer {
            Ok(Ok(choice)) => choice,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "continue prompt failed, stopping");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "continue prompt aborted, stopping");
                false
            }
        }
    }
}

/// Allows a fixed number of turns, for unattended runs
#[derive(Debug)]
pub struct TurnLimit {
    max_turns: usize,
    completed: AtomicUsize,
}

impl TurnLimit {
    #[must_use]
    pub const fn new(max_turns: usize) -> Self {
        Self {
            max_turns,
            completed: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TurnControl for TurnLimit {
    async fn should_continue(&self) -> bool {
        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        let more = completed < self.max_turns;
        tracing::debug!(completed, max_turns = self.max_turns, more, "turn limit check");
        more
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_turn_limit_stops_after_n() {
        let control = TurnLimit::new(3);
        assert!(control.should_continue().await);
        assert!(control.should_continue().await);
        assert!(!control.should_continue().await);
        assert!(!control.should_continue().await);
    }

    #[tokio::test]
    async fn test_turn_limit_of_one() {
        let control = TurnLimit::new(1);
        assert!(!control.should_continue().await);
    }
}
