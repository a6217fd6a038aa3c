use async_trait::async_trait;

use super::types::ChatMessage;
use crate::core::errors::ApiError;

/// Text-completion service. One call per invocation, no retries here —
/// retry policy, if any, belongs to the caller's transport layer.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, ApiError>;
}

/// Embedding service used by the retrieval index.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError>;
}
