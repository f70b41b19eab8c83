use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::api::{error::ApiError, state::AppState};
use crate::application::SessionState;
use crate::domain::{Answer, Message};

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub grounded: Answer,
    pub ungrounded: Answer,
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<Message>,
    pub session: SessionState,
}

pub async fn list_messages(State(state): State<AppState>) -> Json<MessagesResponse> {
    let session = state.session.lock().await;
    Json(MessagesResponse {
        messages: session.conversation().messages().to_vec(),
        session: session.state(),
    })
}

/// Runs one turn: the question is answered with retrieved context, then
/// again by the bare model. The full history comes back so the page can
/// redraw without a second request.
pub async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let mut session = state.session.lock().await;
    let turn = session.ask(&request.question).await?;

    Ok(Json(ChatResponse {
        grounded: turn.grounded,
        ungrounded: turn.ungrounded,
        messages: session.conversation().messages().to_vec(),
    }))
}
