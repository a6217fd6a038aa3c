//! Nearest-neighbor retrieval over the vector index.
//!
//! The retriever owns the index handle: searches take a shared guard and
//! index mutation (adding documents) takes the exclusive guard, so a write
//! never interleaves with a concurrent read against the same index.

use std::sync::Arc;

use tokio::sync::RwLock;

use super::store::{DocumentChunk, RagError, VectorStore};
use crate::batching::{batch_by_tokens, MAX_TOKENS_PER_BATCH};
use crate::llm::EmbeddingProvider;
use crate::tokenizer::TokenCounter;

/// When filtering by source prefix, over-fetch by this factor before
/// filtering so the truncated result can still fill `k` slots.
const PREFIX_FILTER_OVERSAMPLE: usize = 4;

pub struct Retriever {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    counter: Arc<dyn TokenCounter>,
    gate: RwLock<()>,
}

impl Retriever {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        counter: Arc<dyn TokenCounter>,
    ) -> Self {
        Self {
            store,
            embedder,
            counter,
            gate: RwLock::new(()),
        }
    }

    /// Ranked chunks for a question, optionally restricted to sources under
    /// any of `file_prefixes`.
    ///
    /// Returns [`RagError::Unavailable`] while the index is still empty so
    /// callers can tell the user to upload documents instead of treating it
    /// as a server failure.
    pub async fn similarity_search(
        &self,
        question: &str,
        k: usize,
        file_prefixes: &[String],
    ) -> Result<Vec<DocumentChunk>, RagError> {
        let _guard = self.gate.read().await;

        if self.store.count().await? == 0 {
            return Err(RagError::Unavailable);
        }

        let query_embedding = self
            .embedder
            .embed(&[question.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Store("embedding service returned no vector".to_string()))?;

        if file_prefixes.is_empty() {
            let results = self.store.search(&query_embedding, k).await?;
            return Ok(results.into_iter().map(|r| r.chunk).collect());
        }

        let results = self
            .store
            .search(&query_embedding, k * PREFIX_FILTER_OVERSAMPLE)
            .await?;

        let mut filtered: Vec<DocumentChunk> = results
            .into_iter()
            .map(|r| r.chunk)
            .filter(|chunk| {
                chunk
                    .source()
                    .map(|source| file_prefixes.iter().any(|p| source.starts_with(p.as_str())))
                    .unwrap_or(false)
            })
            .collect();
        filtered.truncate(k);

        Ok(filtered)
    }

    /// Embed and index a set of chunks.
    ///
    /// Embedding requests are themselves token-bounded: a corpus over the
    /// per-request budget is partitioned with the document batcher and
    /// embedded batch by batch.
    pub async fn add_documents(&self, chunks: Vec<DocumentChunk>) -> Result<(), RagError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let _guard = self.gate.write().await;

        let total_tokens: usize = chunks
            .iter()
            .map(|c| self.counter.count_tokens(&c.content))
            .sum();
        tracing::info!(
            "Indexing {} chunks ({} tokens total)",
            chunks.len(),
            total_tokens
        );

        let batches = if total_tokens > MAX_TOKENS_PER_BATCH {
            let batches = batch_by_tokens(self.counter.as_ref(), chunks, MAX_TOKENS_PER_BATCH);
            tracing::info!("Corpus over the embedding budget; {} batches", batches.len());
            batches
        } else {
            vec![chunks]
        };

        for (i, batch) in batches.iter().enumerate() {
            let inputs: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let embeddings = self.embedder.embed(&inputs).await?;

            if embeddings.len() != batch.len() {
                return Err(RagError::Store(format!(
                    "embedding batch {} returned {} vectors for {} chunks",
                    i + 1,
                    embeddings.len(),
                    batch.len()
                )));
            }

            let items: Vec<(DocumentChunk, Vec<f32>)> =
                batch.iter().cloned().zip(embeddings).collect();
            self.store.insert_batch(items).await?;
            tracing::info!("Indexed batch {}/{} ({} chunks)", i + 1, batches.len(), batch.len());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ApiError;
    use crate::rag::store::ChunkSearchResult;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct WordCounter;

    impl TokenCounter for WordCounter {
        fn count_tokens(&self, text: &str) -> usize {
            text.split_whitespace().count()
        }
    }

    struct StubEmbedder;

    #[async_trait]
    impl EmbeddingProvider for StubEmbedder {
        async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
            Ok(inputs.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    /// Records the limits it was searched with and serves canned chunks.
    struct RecordingStore {
        chunks: Vec<DocumentChunk>,
        search_limits: Mutex<Vec<usize>>,
    }

    impl RecordingStore {
        fn new(chunks: Vec<DocumentChunk>) -> Self {
            Self {
                chunks,
                search_limits: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl VectorStore for RecordingStore {
        async fn insert_batch(
            &self,
            _items: Vec<(DocumentChunk, Vec<f32>)>,
        ) -> Result<(), ApiError> {
            Ok(())
        }

        async fn search(
            &self,
            _query_embedding: &[f32],
            limit: usize,
        ) -> Result<Vec<ChunkSearchResult>, ApiError> {
            self.search_limits.lock().unwrap().push(limit);
            Ok(self
                .chunks
                .iter()
                .take(limit)
                .cloned()
                .map(|chunk| ChunkSearchResult { chunk, score: 1.0 })
                .collect())
        }

        async fn count(&self) -> Result<usize, ApiError> {
            Ok(self.chunks.len())
        }
    }

    fn chunk(content: &str, source: &str) -> DocumentChunk {
        let mut metadata = serde_json::Map::new();
        metadata.insert("source".to_string(), json!(source));
        DocumentChunk::new(content, metadata)
    }

    fn retriever(store: RecordingStore) -> (Arc<RecordingStore>, Retriever) {
        let store = Arc::new(store);
        let retriever = Retriever::new(
            store.clone(),
            Arc::new(StubEmbedder),
            Arc::new(WordCounter),
        );
        (store, retriever)
    }

    #[tokio::test]
    async fn empty_index_is_unavailable() {
        let (_store, retriever) = retriever(RecordingStore::new(vec![]));
        let err = retriever
            .similarity_search("anything", 5, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Unavailable));
    }

    #[tokio::test]
    async fn unfiltered_search_requests_k() {
        let chunks = vec![chunk("a", "uploads/a.txt"), chunk("b", "uploads/b.txt")];
        let (store, retriever) = retriever(RecordingStore::new(chunks));

        let results = retriever.similarity_search("q", 5, &[]).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(*store.search_limits.lock().unwrap(), vec![5]);
    }

    #[tokio::test]
    async fn prefix_filter_oversamples_then_truncates() {
        let chunks = vec![
            chunk("a", "uploads/reports/q1.txt"),
            chunk("b", "uploads/manual.pdf"),
            chunk("c", "uploads/reports/q2.txt"),
            chunk("d", "uploads/reports/q3.txt"),
            chunk("e", "uploads/notes.md"),
        ];
        let (store, retriever) = retriever(RecordingStore::new(chunks));

        let prefixes = vec!["uploads/reports/".to_string()];
        let results = retriever.similarity_search("q", 2, &prefixes).await.unwrap();

        // Candidates are fetched at 4*k, then filtered and cut to k.
        assert_eq!(*store.search_limits.lock().unwrap(), vec![8]);
        assert_eq!(results.len(), 2);
        for chunk in &results {
            assert!(chunk.source().unwrap().starts_with("uploads/reports/"));
        }
    }

    #[tokio::test]
    async fn prefix_filter_drops_chunks_without_source() {
        let chunks = vec![
            DocumentChunk::new("no source", serde_json::Map::new()),
            chunk("b", "uploads/manual.pdf"),
        ];
        let (_store, retriever) = retriever(RecordingStore::new(chunks));

        let prefixes = vec!["uploads/".to_string()];
        let results = retriever.similarity_search("q", 5, &prefixes).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "b");
    }
}
