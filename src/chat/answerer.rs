//! Single-batch answering: one bounded prompt, one completion call.

use serde_json::Value;

use super::prompts;
use crate::core::errors::ApiError;
use crate::llm::{ChatMessage, CompletionProvider};
use crate::rag::DocumentChunk;
use crate::tokenizer::TokenCounter;

/// Answers `question` against one batch of context chunks.
///
/// Issues exactly one completion call and returns its text unmodified.
/// Failures propagate; retries are the caller's concern.
pub async fn answer_batch(
    provider: &dyn CompletionProvider,
    counter: &dyn TokenCounter,
    question: &str,
    batch: &[DocumentChunk],
    recent_history: &str,
) -> Result<String, ApiError> {
    let context_text = format_context(batch);
    tracing::debug!(
        "Context for this batch: {} tokens",
        counter.count_tokens(&context_text)
    );

    let messages = vec![
        ChatMessage::system(prompts::system_prompt(recent_history, &context_text)),
        ChatMessage::user(prompts::user_prompt(question)),
    ];

    provider.complete(messages).await
}

/// Context block: per-chunk header (1-based index, source, page) followed by
/// the chunk's raw content, in batch order.
fn format_context(batch: &[DocumentChunk]) -> String {
    let mut context_text = String::new();
    for (i, chunk) in batch.iter().enumerate() {
        let source = chunk.source().unwrap_or("Desconhecido");
        let page = chunk
            .metadata
            .get("page")
            .map(render_metadata_value)
            .unwrap_or_else(|| "N/A".to_string());

        context_text.push_str(&format!(
            "\n\nDocumento {} (Fonte: {}, Página: {}):\n{}",
            i + 1,
            source,
            page,
            chunk.content
        ));
    }
    context_text
}

fn render_metadata_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => "N/A".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chunk(content: &str, source: Option<&str>, page: Option<i64>) -> DocumentChunk {
        let mut metadata = serde_json::Map::new();
        if let Some(source) = source {
            metadata.insert("source".to_string(), json!(source));
        }
        if let Some(page) = page {
            metadata.insert("page".to_string(), json!(page));
        }
        DocumentChunk::new(content, metadata)
    }

    #[test]
    fn context_headers_are_indexed_and_sourced() {
        let batch = vec![
            chunk("primeiro trecho", Some("uploads/a.pdf"), Some(2)),
            chunk("segundo trecho", Some("uploads/b.txt"), None),
        ];

        let context = format_context(&batch);
        assert!(context.contains("Documento 1 (Fonte: uploads/a.pdf, Página: 2):\nprimeiro trecho"));
        assert!(context.contains("Documento 2 (Fonte: uploads/b.txt, Página: N/A):\nsegundo trecho"));
    }

    #[test]
    fn missing_source_uses_placeholder() {
        let context = format_context(&[chunk("texto", None, None)]);
        assert!(context.contains("Fonte: Desconhecido"));
        assert!(context.contains("Página: N/A"));
    }

    #[test]
    fn empty_batch_yields_empty_context() {
        assert_eq!(format_context(&[]), "");
    }

    #[test]
    fn string_page_metadata_is_rendered_verbatim() {
        let mut metadata = serde_json::Map::new();
        metadata.insert("page".to_string(), json!("iv"));
        let context = format_context(&[DocumentChunk::new("texto", metadata)]);
        assert!(context.contains("Página: iv"));
    }
}
