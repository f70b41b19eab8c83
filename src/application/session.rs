use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

use crate::application::QueryPipeline;
use crate::domain::{Answer, AnswerMode, ConversationState, DomainError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "mode", rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    AwaitingInput,
    Processing(AnswerMode),
}

#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub grounded: Answer,
    pub ungrounded: Answer,
}

/// One user's chat: the conversation history plus the query pipeline that
/// answers each question twice, grounded first, then ungrounded.
pub struct ChatSession {
    query: Arc<QueryPipeline>,
    conversation: ConversationState,
    state: SessionState,
}

impl ChatSession {
    pub fn new(query: Arc<QueryPipeline>) -> Self {
        Self {
            query,
            conversation: ConversationState::new(),
            state: SessionState::Idle,
        }
    }

    pub fn conversation(&self) -> &ConversationState {
        &self.conversation
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Runs one turn. Messages appended before a failure stay in the
    /// history; the session is back to `Idle` either way, also when the
    /// turn is dropped mid-call.
    #[instrument(skip(self, question), fields(conversation = %self.conversation.id()))]
    pub async fn ask(&mut self, question: &str) -> Result<Turn, DomainError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(DomainError::validation("question must not be empty"));
        }

        let Self {
            query,
            conversation,
            state,
        } = self;
        let mut turn = TurnGuard { state };
        turn.transition(SessionState::AwaitingInput);
        conversation.push_user(question);

        let result = answer_both(query, conversation, &mut turn, question).await;
        drop(turn);

        if let Err(e) = &result {
            tracing::error!(error = %e, "turn failed");
        }
        result
    }
}

/// Holds the session state for the length of a turn and resets it to
/// `Idle` on drop.
struct TurnGuard<'a> {
    state: &'a mut SessionState,
}

impl TurnGuard<'_> {
    fn transition(&mut self, next: SessionState) {
        tracing::debug!(from = ?*self.state, to = ?next, "session transition");
        *self.state = next;
    }
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.transition(SessionState::Idle);
    }
}

async fn answer_both(
    query: &QueryPipeline,
    conversation: &mut ConversationState,
    turn: &mut TurnGuard<'_>,
    question: &str,
) -> Result<Turn, DomainError> {
    turn.transition(SessionState::Processing(AnswerMode::Grounded));
    let grounded = query.grounded(question).await?;
    conversation.push_answer(AnswerMode::Grounded, grounded.data.clone());

    turn.transition(SessionState::Processing(AnswerMode::Ungrounded));
    let ungrounded = query.ungrounded(question).await?;
    conversation.push_answer(AnswerMode::Ungrounded, ungrounded.data.clone());

    Ok(Turn {
        grounded,
        ungrounded,
    })
}
