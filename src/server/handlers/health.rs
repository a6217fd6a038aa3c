use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

pub async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let total_messages = state.history.total_message_count().await.unwrap_or(0);
    Json(json!({
        "status": "online",
        "message": "API está funcionando corretamente",
        "total_messages": total_messages
    }))
}
