//! Multi-batch answer synthesis.
//!
//! Orchestrates batching and per-batch answering for a question and, when
//! the context needed more than one batch, merges the partial answers with
//! one further completion call. Stateless between calls: question, chunks
//! and history all come from the caller.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::answerer::answer_batch;
use super::prompts;
use crate::batching::{batch_by_tokens, MAX_TOKENS_PER_BATCH};
use crate::core::errors::ApiError;
use crate::llm::{ChatMessage, CompletionProvider};
use crate::rag::DocumentChunk;
use crate::tokenizer::TokenCounter;

/// How many trailing history turns are rendered into the prompt.
const RECENT_HISTORY_TURNS: usize = 5;

/// One turn of session chat history, owned by the session layer and read
/// here only while building a prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
    pub timestamp: f64,
}

/// Wraps any completion-service or batching failure behind one error type.
/// Carries the underlying message for logs; the transport layer turns it
/// into a user-facing retryable response.
#[derive(Debug, Error)]
#[error("falha ao gerar resposta: {0}")]
pub struct AnswerGenerationError(pub String);

impl From<ApiError> for AnswerGenerationError {
    fn from(err: ApiError) -> Self {
        AnswerGenerationError(err.to_string())
    }
}

pub struct AnswerPipeline {
    provider: Arc<dyn CompletionProvider>,
    counter: Arc<dyn TokenCounter>,
}

impl AnswerPipeline {
    pub fn new(provider: Arc<dyn CompletionProvider>, counter: Arc<dyn TokenCounter>) -> Self {
        Self { provider, counter }
    }

    /// Generates the final answer text for a question.
    ///
    /// Handoff requests short-circuit before any retrieval, batching or
    /// completion work. Per-batch completion calls run sequentially, in
    /// batch order — merge quality depends on that order. Partial answers
    /// are never exposed if the merge step fails.
    pub async fn generate_answer(
        &self,
        question: &str,
        context_chunks: Vec<DocumentChunk>,
        chat_history: &[ChatTurn],
    ) -> Result<String, AnswerGenerationError> {
        if prompts::is_human_handoff_request(question) {
            tracing::info!("Human handoff requested; skipping answer generation");
            return Ok(prompts::HANDOFF_MESSAGE.to_string());
        }

        let recent_history = format_recent_history(chat_history);

        let batches = batch_by_tokens(self.counter.as_ref(), context_chunks, MAX_TOKENS_PER_BATCH);

        if batches.is_empty() {
            tracing::warn!("No context available for the question");
            return Ok(prompts::NO_CONTEXT_MESSAGE.to_string());
        }

        if batches.len() == 1 {
            let answer = answer_batch(
                self.provider.as_ref(),
                self.counter.as_ref(),
                question,
                &batches[0],
                &recent_history,
            )
            .await?;
            return Ok(answer);
        }

        tracing::info!(
            "Context split into {} batches; answering each before synthesis",
            batches.len()
        );

        let mut partial_answers = Vec::with_capacity(batches.len());
        for (i, batch) in batches.iter().enumerate() {
            tracing::info!("Answering batch {} of {}", i + 1, batches.len());
            let answer = answer_batch(
                self.provider.as_ref(),
                self.counter.as_ref(),
                question,
                batch,
                &recent_history,
            )
            .await?;
            partial_answers.push(answer);
        }

        let synthesis = prompts::synthesis_prompt(question, &partial_answers);
        let merged = self
            .provider
            .complete(vec![ChatMessage::system(synthesis)])
            .await?;

        tracing::info!("Synthesized final answer from {} partial answers", partial_answers.len());
        Ok(merged)
    }
}

/// Renders at most the last five turns as `Role: content` lines, oldest
/// first. Turns missing a role or content are skipped. Empty history yields
/// an empty string.
fn format_recent_history(chat_history: &[ChatTurn]) -> String {
    let start = chat_history.len().saturating_sub(RECENT_HISTORY_TURNS);
    chat_history[start..]
        .iter()
        .filter(|turn| !turn.role.is_empty() && !turn.content.is_empty())
        .map(|turn| format!("{}: {}", capitalize(&turn.role), turn.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn capitalize(role: &str) -> String {
    let mut chars = role.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
