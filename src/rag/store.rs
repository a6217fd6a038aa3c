//! Vector store abstraction and the chunk data model.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::core::errors::ApiError;

/// A chunk of document text with its metadata.
///
/// Chunks are created at ingestion or retrieval time and live only for the
/// duration of one request; nothing in the answer pipeline persists them.
/// Common metadata keys: `source`, `filename`, `page`, `upload_time`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl DocumentChunk {
    pub fn new(content: impl Into<String>, metadata: Map<String, Value>) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }

    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(|v| v.as_str())
    }
}

/// Result of a similarity search, higher score is closer.
#[derive(Debug, Clone)]
pub struct ChunkSearchResult {
    pub chunk: DocumentChunk,
    pub score: f32,
}

/// Retrieval-layer errors, separated so callers can tell "no index yet"
/// (client-correctable) apart from genuine storage failures.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("vector index is empty; documents must be uploaded first")]
    Unavailable,
    #[error("{0}")]
    Store(String),
}

impl From<ApiError> for RagError {
    fn from(err: ApiError) -> Self {
        RagError::Store(err.to_string())
    }
}

/// Abstract vector store backend.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert chunks with their embedding vectors, atomically.
    async fn insert_batch(
        &self,
        items: Vec<(DocumentChunk, Vec<f32>)>,
    ) -> Result<(), ApiError>;

    /// Rank stored chunks against the query embedding, best first.
    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<ChunkSearchResult>, ApiError>;

    /// Total number of stored chunks.
    async fn count(&self) -> Result<usize, ApiError>;
}
