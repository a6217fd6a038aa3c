use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::errors::ApiError;
use crate::rag::{DocumentChunk, RagError};
use crate::state::AppState;

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize)]
pub struct QuestionRequest {
    pub question: String,
    pub session_id: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub file_paths: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct QuestionResponse {
    pub answer: String,
    pub sources: Vec<Value>,
    pub session_id: String,
}

/// One-shot question answering over HTTP. History-free: persistent context
/// belongs to the WebSocket chat.
pub async fn ask_question(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QuestionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.question.trim().is_empty() {
        return Err(ApiError::BadRequest("Pergunta não fornecida".to_string()));
    }

    let docs = state
        .retriever
        .similarity_search(&request.question, request.top_k, &request.file_paths)
        .await
        .map_err(map_rag_error)?;

    let answer = state
        .pipeline
        .generate_answer(&request.question, docs.clone(), &[])
        .await
        .map_err(|err| {
            tracing::error!("Answer generation failed: {}", err);
            ApiError::Internal(
                "Não foi possível gerar a resposta no momento. Tente novamente.".to_string(),
            )
        })?;

    tracing::info!(
        "Answered question: {}...",
        request.question.chars().take(50).collect::<String>()
    );

    Ok(Json(QuestionResponse {
        answer,
        sources: source_payload(&docs),
        session_id: request.session_id,
    }))
}

pub fn map_rag_error(err: RagError) -> ApiError {
    match err {
        RagError::Unavailable => ApiError::BadRequest(
            "Nenhum documento foi carregado ainda. Envie documentos antes de fazer perguntas."
                .to_string(),
        ),
        RagError::Store(message) => {
            tracing::error!("Retrieval failed: {}", message);
            ApiError::Internal("Erro ao consultar os documentos".to_string())
        }
    }
}

pub fn source_payload(docs: &[DocumentChunk]) -> Vec<Value> {
    docs.iter()
        .map(|doc| json!({"content": doc.content, "metadata": doc.metadata}))
        .collect()
}
