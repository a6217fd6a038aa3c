//! WebSocket chat loop.
//!
//! Each question runs the full retrieve-and-answer pipeline; nothing is kept
//! between messages except the session's persisted history. One slow answer
//! only blocks its own connection.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use chrono::Utc;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};

use super::protocol::WsIncomingMessage;
use crate::chat::ChatTurn;
use crate::core::errors::ApiError;
use crate::rag::RagError;
use crate::server::handlers::questions::source_payload;
use crate::state::AppState;

const DEFAULT_TOP_K: usize = 5;
const HISTORY_WINDOW: i64 = 100;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, session_id: String) {
    tracing::info!("WebSocket connected for session {}", session_id);
    let (mut sender, mut receiver) = socket.split();

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => {
                if let Err(err) = handle_text(&mut sender, &state, &session_id, &text).await {
                    let _ = send_json(
                        &mut sender,
                        json!({"role": "system", "content": err.to_string(), "error": true}),
                    )
                    .await;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    tracing::info!("WebSocket disconnected for session {}", session_id);
}

async fn handle_text(
    sender: &mut SplitSink<WebSocket, Message>,
    state: &Arc<AppState>,
    session_id: &str,
    text: &str,
) -> Result<(), ApiError> {
    let incoming: WsIncomingMessage = match serde_json::from_str(text) {
        Ok(incoming) => incoming,
        Err(err) => {
            tracing::warn!("Malformed WS frame: {}", err);
            send_json(
                sender,
                json!({
                    "role": "system",
                    "content": format!("Formato JSON inválido: {}", err),
                    "error": true
                }),
            )
            .await?;
            return Ok(());
        }
    };

    let Some(question) = incoming.question().map(|q| q.to_string()) else {
        return Ok(());
    };
    let top_k = incoming.top_k.unwrap_or(DEFAULT_TOP_K);
    let file_paths = incoming.file_paths.clone();

    let timestamp = epoch_now();
    send_json(
        sender,
        json!({"role": "user", "content": question, "timestamp": timestamp}),
    )
    .await?;
    state
        .history
        .add_message(
            session_id,
            "user",
            &question,
            Some(json!({"timestamp": timestamp})),
        )
        .await?;

    send_json(
        sender,
        json!({"role": "system", "content": "typing", "typing": true}),
    )
    .await?;

    let docs = match state
        .retriever
        .similarity_search(&question, top_k, &file_paths)
        .await
    {
        Ok(docs) => docs,
        Err(RagError::Unavailable) => {
            send_json(
                sender,
                json!({
                    "role": "system",
                    "content": "Nenhum documento foi carregado ainda. Envie documentos antes de fazer perguntas.",
                    "error": true
                }),
            )
            .await?;
            return Ok(());
        }
        Err(RagError::Store(message)) => {
            tracing::error!("Retrieval failed: {}", message);
            send_json(
                sender,
                json!({
                    "role": "system",
                    "content": "Erro ao consultar os documentos",
                    "error": true
                }),
            )
            .await?;
            return Ok(());
        }
    };

    let chat_history: Vec<ChatTurn> = state
        .history
        .get_history(session_id, HISTORY_WINDOW)
        .await?
        .iter()
        .map(|m| m.to_chat_turn())
        .collect();

    let answer = match state
        .pipeline
        .generate_answer(&question, docs.clone(), &chat_history)
        .await
    {
        Ok(answer) => answer,
        Err(err) => {
            tracing::error!("Answer generation failed: {}", err);
            send_json(
                sender,
                json!({
                    "role": "system",
                    "content": "Não foi possível gerar a resposta no momento. Tente novamente.",
                    "error": true
                }),
            )
            .await?;
            return Ok(());
        }
    };

    let timestamp = epoch_now();
    send_json(
        sender,
        json!({
            "role": "assistant",
            "content": answer,
            "sources": source_payload(&docs),
            "timestamp": timestamp
        }),
    )
    .await?;
    state
        .history
        .add_message(
            session_id,
            "assistant",
            &answer,
            Some(json!({"timestamp": timestamp})),
        )
        .await?;

    Ok(())
}

async fn send_json(
    sender: &mut SplitSink<WebSocket, Message>,
    payload: Value,
) -> Result<(), ApiError> {
    let text = serde_json::to_string(&payload).map_err(ApiError::internal)?;
    sender
        .send(Message::Text(text))
        .await
        .map_err(ApiError::internal)?;
    Ok(())
}

fn epoch_now() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}
