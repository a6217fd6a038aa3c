//! Token counting backed by the `cl100k_base` BPE encoding.
//!
//! All sizing decisions (batching, ingestion splitting) go through
//! [`TokenCounter`] so tests can substitute a deterministic counter.

use tiktoken_rs::{cl100k_base, CoreBPE};

use crate::core::errors::ApiError;

/// Counts tokens for a text blob. Pure and deterministic.
pub trait TokenCounter: Send + Sync {
    fn count_tokens(&self, text: &str) -> usize;
}

/// The production counter. Construction loads the encoder tables and is
/// fatal on failure; it happens once at process start, never per call.
pub struct Tokenizer {
    bpe: CoreBPE,
}

impl Tokenizer {
    pub fn new() -> Result<Self, ApiError> {
        let bpe = cl100k_base().map_err(|err| {
            ApiError::Internal(format!("failed to initialize cl100k_base encoder: {}", err))
        })?;
        Ok(Self { bpe })
    }
}

impl TokenCounter for Tokenizer {
    fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_has_zero_tokens() {
        let tokenizer = Tokenizer::new().unwrap();
        assert_eq!(tokenizer.count_tokens(""), 0);
    }

    #[test]
    fn counting_is_deterministic() {
        let tokenizer = Tokenizer::new().unwrap();
        let text = "O céu é azul e o oceano é profundo.";
        let first = tokenizer.count_tokens(text);
        assert!(first > 0);
        assert_eq!(first, tokenizer.count_tokens(text));
    }

    #[test]
    fn longer_text_has_more_tokens() {
        let tokenizer = Tokenizer::new().unwrap();
        let short = tokenizer.count_tokens("hello");
        let long = tokenizer.count_tokens(&"hello world ".repeat(50));
        assert!(long > short);
    }
}
