use std::path::Path;
use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::errors::ApiError;
use crate::ingest::{self, IngestError};
use crate::rag::RagError;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct DocumentInfo {
    pub filename: String,
    pub upload_time: String,
    pub file_path: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub file_type: String,
}

/// Lists uploaded documents, newest first.
pub async fn list_documents(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let uploads_dir = &state.paths.uploads_dir;
    if !uploads_dir.exists() {
        return Ok(Json(Vec::<DocumentInfo>::new()));
    }

    let entries = std::fs::read_dir(uploads_dir)
        .map_err(|e| ApiError::internal(format!("Falha ao listar documentos: {}", e)))?;

    let mut documents = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        let upload_time = metadata
            .modified()
            .map(|t| DateTime::<Utc>::from(t).to_rfc3339())
            .unwrap_or_default();

        documents.push(DocumentInfo {
            filename: entry.file_name().to_string_lossy().to_string(),
            upload_time,
            file_path: path.display().to_string(),
            size: metadata.len(),
            file_type: file_extension(&path),
        });
    }

    documents.sort_by(|a, b| b.upload_time.cmp(&a.upload_time));
    Ok(Json(documents))
}

/// Receives a multipart upload, ingests it and adds it to the vector index.
pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut file_name: Option<String> = None;
    let mut file_content: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Upload inválido: {}", e)))?
    {
        if let Some(name) = field.file_name().map(|n| n.to_string()) {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Upload inválido: {}", e)))?;
            file_name = Some(name);
            file_content = Some(bytes.to_vec());
            break;
        }
    }

    let (file_name, file_content) = match (file_name, file_content) {
        (Some(name), Some(content)) => (name, content),
        _ => return Err(ApiError::BadRequest("Nenhum arquivo enviado".to_string())),
    };

    if file_content.is_empty() {
        return Err(ApiError::BadRequest("Arquivo vazio".to_string()));
    }

    // Drop any client-supplied directory components.
    let file_name = Path::new(&file_name)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| ApiError::BadRequest("Nome de arquivo inválido".to_string()))?;

    let file_path = state.paths.uploads_dir.join(&file_name);
    std::fs::write(&file_path, &file_content)
        .map_err(|e| ApiError::internal(format!("Falha ao salvar o arquivo: {}", e)))?;
    tracing::info!("Saved upload to {}", file_path.display());

    let text = ingest::extract_text(&file_path).map_err(|err| match err {
        IngestError::UnsupportedFormat(_) => ApiError::BadRequest(err.to_string()),
        IngestError::Read { .. } => {
            tracing::error!("Extraction failed: {}", err);
            ApiError::Internal("Erro ao processar o documento".to_string())
        }
    })?;

    let upload_time = Utc::now().to_rfc3339();
    let chunks = ingest::process_document(
        state.tokenizer.as_ref(),
        &text,
        &file_path.display().to_string(),
        &file_name,
        &upload_time,
    );

    state.retriever.add_documents(chunks).await.map_err(|err| {
        tracing::error!("Indexing failed: {}", err);
        match err {
            RagError::Unavailable => ApiError::internal("vector index unavailable"),
            RagError::Store(_) => {
                ApiError::Internal("Erro ao indexar o documento".to_string())
            }
        }
    })?;

    let size = file_content.len() as u64;
    tracing::info!("Document indexed: {}", file_name);

    Ok(Json(DocumentInfo {
        file_type: file_extension(&file_path),
        filename: file_name,
        upload_time,
        file_path: file_path.display().to_string(),
        size,
    }))
}

fn file_extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default()
}
