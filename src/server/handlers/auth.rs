use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::auth::SessionError;
use crate::core::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ValidateSessionQuery {
    pub session_id: String,
}

pub async fn create_session(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let session_id = state.sessions.create().map_err(map_session_error)?;

    Ok(Json(json!({
        "session_id": session_id,
        "expires_in_minutes": state.sessions.expiry_minutes(),
        "iframe_url": format!("/client/iframe.html?session_id={}", session_id)
    })))
}

pub async fn validate_session(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ValidateSessionQuery>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .sessions
        .validate_and_consume(&query.session_id)
        .map_err(map_session_error)?;

    Ok(Json(json!({
        "valid": true,
        "message": "Session válida",
        "session_id": query.session_id
    })))
}

pub async fn session_status(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.sessions.stats()))
}

pub async fn cleanup_sessions(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = state.sessions.cleanup_expired();

    Ok(Json(json!({
        "message": "Limpeza de sessions concluída",
        "sessions_removed": removed,
        "sessions_remaining": state.sessions.len()
    })))
}

pub fn map_session_error(err: SessionError) -> ApiError {
    match err {
        SessionError::CapacityExceeded => ApiError::TooManyRequests(
            "Limite de sessions simultâneas atingido. Tente novamente em alguns minutos."
                .to_string(),
        ),
        other => ApiError::Unauthorized(other.to_string()),
    }
}
