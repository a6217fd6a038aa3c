//! Token-bounded batching of document chunks.
//!
//! Partitions an ordered sequence of chunks into batches whose summed token
//! counts stay under a budget, splitting any single chunk that exceeds the
//! budget on its own. Used before completion calls (to keep prompts inside
//! the model's context window) and before embedding calls at ingestion time.

use crate::rag::DocumentChunk;
use crate::tokenizer::TokenCounter;

/// Safety margin under the completion service's hard context ceiling.
pub const MAX_TOKENS_PER_BATCH: usize = 250_000;

// Splitting constants for oversized chunks. Fixed so that batch boundaries
// stay reproducible; changing them changes every downstream prompt.
const SPLIT_WINDOW_CHARS: usize = 1000;
const MIN_FRAGMENT_CHARS: usize = 100;
const WINDOW_SHRINK_FACTOR: f64 = 0.8;

/// Greedy single-pass batching, preserving input order.
///
/// A chunk that exceeds `max_tokens` by itself is split into sequential
/// character-range fragments, each emitted as its own singleton batch.
/// Empty input yields an empty batch list.
pub fn batch_by_tokens(
    counter: &dyn TokenCounter,
    chunks: Vec<DocumentChunk>,
    max_tokens: usize,
) -> Vec<Vec<DocumentChunk>> {
    let mut batches: Vec<Vec<DocumentChunk>> = Vec::new();
    let mut current_batch: Vec<DocumentChunk> = Vec::new();
    let mut current_tokens = 0usize;

    for chunk in chunks {
        let doc_tokens = counter.count_tokens(&chunk.content);

        if doc_tokens > max_tokens {
            if !current_batch.is_empty() {
                batches.push(std::mem::take(&mut current_batch));
                current_tokens = 0;
            }

            tracing::warn!(
                "Chunk of {} tokens exceeds the {}-token budget; splitting",
                doc_tokens,
                max_tokens
            );
            for fragment in split_oversized(counter, &chunk, max_tokens) {
                batches.push(vec![fragment]);
            }
        } else if current_tokens + doc_tokens > max_tokens {
            batches.push(std::mem::take(&mut current_batch));
            current_tokens = doc_tokens;
            current_batch.push(chunk);
        } else {
            current_tokens += doc_tokens;
            current_batch.push(chunk);
        }
    }

    if !current_batch.is_empty() {
        batches.push(current_batch);
    }

    batches
}

/// Splits an oversized chunk into sequential fragments.
///
/// Each fragment starts as a 1000-char window; while it still exceeds the
/// token budget and is wider than 100 chars, the window shrinks to 80% of
/// its width. A fragment that reaches the floor may still exceed the budget
/// and is emitted as-is — callers accept that residual case. Windows are
/// measured in Unicode scalar values, and fragment metadata is a shallow
/// copy of the original chunk's metadata.
fn split_oversized(
    counter: &dyn TokenCounter,
    chunk: &DocumentChunk,
    max_tokens: usize,
) -> Vec<DocumentChunk> {
    let chars: Vec<char> = chunk.content.chars().collect();
    let mut fragments = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let mut end = (start + SPLIT_WINDOW_CHARS).min(chars.len());
        let mut fragment: String = chars[start..end].iter().collect();

        while counter.count_tokens(&fragment) > max_tokens && end > start + MIN_FRAGMENT_CHARS {
            end = start + ((end - start) as f64 * WINDOW_SHRINK_FACTOR) as usize;
            fragment = chars[start..end].iter().collect();
        }

        fragments.push(DocumentChunk {
            content: fragment,
            metadata: chunk.metadata.clone(),
        });

        start = end;
    }

    fragments
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// One token per character, so budgets translate directly to lengths.
    struct CharCounter;

    impl TokenCounter for CharCounter {
        fn count_tokens(&self, text: &str) -> usize {
            text.chars().count()
        }
    }

    fn chunk(content: &str) -> DocumentChunk {
        let mut metadata = serde_json::Map::new();
        metadata.insert("source".to_string(), json!("uploads/manual.pdf"));
        metadata.insert("page".to_string(), json!(3));
        DocumentChunk {
            content: content.to_string(),
            metadata,
        }
    }

    fn concatenated(batches: &[Vec<DocumentChunk>]) -> String {
        batches
            .iter()
            .flatten()
            .map(|c| c.content.as_str())
            .collect()
    }

    #[test]
    fn empty_input_yields_no_batches() {
        let batches = batch_by_tokens(&CharCounter, vec![], 100);
        assert!(batches.is_empty());
    }

    #[test]
    fn single_chunk_under_budget_yields_one_batch() {
        let batches = batch_by_tokens(&CharCounter, vec![chunk("abc")], 100);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 1);
        assert_eq!(batches[0][0].content, "abc");
    }

    #[test]
    fn chunks_accumulate_until_budget() {
        let chunks = vec![chunk("aaaa"), chunk("bbbb"), chunk("cccc")];
        let batches = batch_by_tokens(&CharCounter, chunks, 10);

        // 4 + 4 fits, the third overflows into a new batch.
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[1].len(), 1);
        assert_eq!(batches[1][0].content, "cccc");
    }

    #[test]
    fn order_and_content_are_preserved() {
        let contents = ["alpha", "beta", "gamma", "delta"];
        let chunks: Vec<DocumentChunk> = contents.iter().map(|c| chunk(c)).collect();
        let batches = batch_by_tokens(&CharCounter, chunks, 11);

        assert_eq!(concatenated(&batches), contents.concat());
    }

    #[test]
    fn exact_fit_does_not_overflow() {
        let chunks = vec![chunk("aaaaa"), chunk("bbbbb")];
        let batches = batch_by_tokens(&CharCounter, chunks, 10);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
    }

    #[test]
    fn oversized_chunk_becomes_singleton_fragment_batches() {
        let big = "x".repeat(2500);
        let batches = batch_by_tokens(&CharCounter, vec![chunk(&big)], 10_000);
        // Budget is large enough that splitting never triggers here.
        assert_eq!(batches.len(), 1);

        let batches = batch_by_tokens(&CharCounter, vec![chunk(&big)], 500);
        assert!(batches.len() > 1);
        for batch in &batches {
            assert_eq!(batch.len(), 1, "split fragments must be singleton batches");
        }
        assert_eq!(concatenated(&batches), big);
    }

    #[test]
    fn split_fragments_keep_metadata() {
        let big = "y".repeat(1500);
        let batches = batch_by_tokens(&CharCounter, vec![chunk(&big)], 500);

        for batch in &batches {
            assert_eq!(batch[0].metadata.get("source").unwrap(), "uploads/manual.pdf");
            assert_eq!(batch[0].metadata.get("page").unwrap(), 3);
        }
    }

    #[test]
    fn oversized_chunk_flushes_pending_batch_first() {
        let chunks = vec![chunk("aaaa"), chunk(&"z".repeat(2000)), chunk("bbbb")];
        let batches = batch_by_tokens(&CharCounter, chunks, 800);

        // Pending batch, then fragments, then the trailing chunk.
        assert_eq!(batches[0].len(), 1);
        assert_eq!(batches[0][0].content, "aaaa");
        assert_eq!(batches.last().unwrap()[0].content, "bbbb");
        assert_eq!(
            concatenated(&batches),
            format!("aaaa{}bbbb", "z".repeat(2000))
        );
    }

    #[test]
    fn batch_sums_respect_budget_after_splitting() {
        let chunks = vec![
            chunk(&"a".repeat(300)),
            chunk(&"b".repeat(900)),
            chunk(&"c".repeat(150)),
        ];
        let max_tokens = 400;
        let batches = batch_by_tokens(&CharCounter, chunks, max_tokens);

        for batch in &batches {
            let total: usize = batch.iter().map(|c| CharCounter.count_tokens(&c.content)).sum();
            assert!(total <= max_tokens, "batch of {} tokens over budget", total);
        }
    }

    #[test]
    fn floor_fragment_may_exceed_budget() {
        // With a budget below what 100 chars encode to, the shrink loop
        // stops at the floor and emits an over-budget fragment.
        let big = "w".repeat(400);
        let batches = batch_by_tokens(&CharCounter, vec![chunk(&big)], 10);

        assert!(!batches.is_empty());
        let widest = batches
            .iter()
            .map(|b| b[0].content.chars().count())
            .max()
            .unwrap();
        assert!(widest > 10, "floor fragments stay over budget by design");
        assert!(widest <= SPLIT_WINDOW_CHARS);
        assert_eq!(concatenated(&batches), big);
    }

    #[test]
    fn multibyte_content_splits_on_char_boundaries() {
        let big = "çãé".repeat(600); // 1800 chars, 3600+ bytes
        let batches = batch_by_tokens(&CharCounter, vec![chunk(&big)], 700);

        assert!(batches.len() > 1);
        assert_eq!(concatenated(&batches), big);
    }
}
