use std::sync::Arc;

use crate::auth::SessionStore;
use crate::chat::AnswerPipeline;
use crate::core::config::{AppPaths, ConfigService};
use crate::core::errors::ApiError;
use crate::history::HistoryStore;
use crate::llm::OpenAiProvider;
use crate::rag::{Retriever, SqliteVectorStore, VectorStore};
use crate::tokenizer::Tokenizer;

/// Global application state shared across routes and the WebSocket loop.
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: ConfigService,
    pub sessions: SessionStore,
    pub history: HistoryStore,
    pub retriever: Arc<Retriever>,
    pub pipeline: AnswerPipeline,
    pub tokenizer: Arc<Tokenizer>,
}

impl AppState {
    /// Builds the full service graph.
    ///
    /// Fails fast on a missing API key, an unavailable token encoder or an
    /// unreachable database — none of those are recoverable per-request.
    pub async fn initialize() -> Result<Arc<Self>, ApiError> {
        let paths = Arc::new(AppPaths::new());
        let config = ConfigService::new(paths.clone());

        let api_key = config.openai_api_key()?;
        let tokenizer = Arc::new(Tokenizer::new()?);

        let provider = Arc::new(OpenAiProvider::new(
            config.openai_base_url(),
            api_key,
            config.chat_model(),
            config.embeddings_model(),
            config.temperature(),
        ));

        let store: Arc<dyn VectorStore> =
            Arc::new(SqliteVectorStore::new(paths.rag_db_path.clone()).await?);
        match store.count().await {
            Ok(0) => tracing::info!("Vector index is empty; it fills as documents are uploaded"),
            Ok(count) => tracing::info!("Vector index loaded with {} chunks", count),
            Err(err) => tracing::warn!("Could not read vector index size: {}", err),
        }

        let retriever = Arc::new(Retriever::new(
            store,
            provider.clone(),
            tokenizer.clone(),
        ));

        let history = HistoryStore::new(paths.history_db_path.clone()).await?;
        let sessions = SessionStore::new(config.session_expiry_minutes(), config.max_sessions());
        let pipeline = AnswerPipeline::new(provider, tokenizer.clone());

        Ok(Arc::new(AppState {
            paths,
            config,
            sessions,
            history,
            retriever,
            pipeline,
            tokenizer,
        }))
    }
}
