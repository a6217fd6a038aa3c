use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::server::handlers::{auth, documents, health, questions};
use crate::server::ws::handler::ws_handler;
use crate::state::AppState;

const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Builds the application router: REST endpoints, the WebSocket chat, the
/// gated static client and the CORS/trace middleware.
pub fn router(state: Arc<AppState>) -> Router {
    let cors_layer = build_cors_layer(&state);

    let mut app = Router::new()
        .route("/status", get(health::status))
        .route(
            "/documents",
            get(documents::list_documents),
        )
        .route("/documents/list", get(documents::list_documents))
        .route("/documents/upload", post(documents::upload_document))
        .route("/upload", post(documents::upload_document))
        .route("/ask", post(questions::ask_question))
        .route("/questions/ask", post(questions::ask_question))
        .route("/auth/create-session", post(auth::create_session))
        .route("/auth/validate-session", get(auth::validate_session))
        .route("/auth/session-status", get(auth::session_status))
        .route("/auth/cleanup-sessions", delete(auth::cleanup_sessions))
        .route("/ws/:session_id", get(ws_handler))
        .route("/ws/chat/:session_id", get(ws_handler));

    let client_dir = state.paths.project_root.join("client");
    if client_dir.exists() {
        let client = Router::new()
            .nest_service("/client", ServeDir::new(&client_dir))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                iframe_guard,
            ));
        app = app
            .merge(client)
            .route("/", get(|| async { Redirect::to("/client/index.html") }));
    }

    app.with_state(state)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
}

fn build_cors_layer(state: &Arc<AppState>) -> CorsLayer {
    let origins: Vec<HeaderValue> = state
        .config
        .allowed_origins()
        .into_iter()
        .filter_map(|origin| HeaderValue::from_str(&origin).ok())
        .collect();

    if origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Gates the embedded chat page behind a single-use session id.
///
/// Only `/client/iframe.html` is protected; every other static asset passes
/// straight through.
async fn iframe_guard(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if request.uri().path() != "/client/iframe.html" {
        return next.run(request).await;
    }

    let session_id = request
        .uri()
        .query()
        .and_then(|query| {
            query
                .split('&')
                .find_map(|pair| pair.strip_prefix("session_id="))
        })
        .unwrap_or("");

    if session_id.is_empty() {
        tracing::warn!("Iframe access without session id");
        return unauthorized_page("Session ID obrigatório");
    }

    match state.sessions.validate_and_consume(session_id) {
        Ok(()) => {
            tracing::info!("Iframe access authorized for session {}", session_id);
            next.run(request).await
        }
        Err(err) => {
            tracing::warn!("Iframe access denied for {}: {}", session_id, err);
            unauthorized_page(&err.to_string())
        }
    }
}

fn unauthorized_page(message: &str) -> Response {
    let body = format!(
        "<!DOCTYPE html>\n<html lang=\"pt-BR\">\n<head><meta charset=\"UTF-8\">\
<title>Acesso Negado</title></head>\n<body>\n<h1>Acesso Negado</h1>\n<p>{}</p>\n\
<p>Para acessar o chat, você precisa de um session ID válido.</p>\n\
<a href=\"/\">Voltar ao Início</a>\n</body>\n</html>",
        message
    );
    (StatusCode::UNAUTHORIZED, Html(body)).into_response()
}
