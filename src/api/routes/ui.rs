use axum::{extract::State, response::Html};

use crate::api::state::AppState;

const INDEX_HTML: &str = include_str!("../../../assets/index.html");

/// The chat page. The only server-side value is the retention notice.
pub async fn index(State(state): State<AppState>) -> Html<String> {
    let ttl_minutes = state.config.config.database.document_ttl_seconds / 60;
    Html(INDEX_HTML.replace("{{ttl_minutes}}", &ttl_minutes.to_string()))
}
