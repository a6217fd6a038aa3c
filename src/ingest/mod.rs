//! Document ingestion: text extraction and token-aware chunking.

use std::path::Path;

use serde_json::json;
use thiserror::Error;

use crate::rag::DocumentChunk;
use crate::tokenizer::TokenCounter;

/// Token budget per ingestion chunk.
pub const CHUNK_SIZE_TOKENS: usize = 1000;
/// Tokens of trailing context repeated at the start of the next chunk.
pub const CHUNK_OVERLAP_TOKENS: usize = 200;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("formato de arquivo não suportado: {0}")]
    UnsupportedFormat(String),
    #[error("falha ao ler o arquivo {path}: {message}")]
    Read { path: String, message: String },
}

/// Extracts plain text from a file based on its extension.
///
/// Supported: `.pdf`, `.txt`, `.md`. Anything else is
/// [`IngestError::UnsupportedFormat`].
pub fn extract_text(path: &Path) -> Result<String, IngestError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "pdf" => pdf_extract::extract_text(path).map_err(|err| IngestError::Read {
            path: path.display().to_string(),
            message: err.to_string(),
        }),
        "txt" | "md" => std::fs::read_to_string(path).map_err(|err| IngestError::Read {
            path: path.display().to_string(),
            message: err.to_string(),
        }),
        other => Err(IngestError::UnsupportedFormat(format!(".{}", other))),
    }
}

/// Splits text into chunks bounded by a token budget, with a sliding token
/// overlap between adjacent chunks.
///
/// Splitting happens at sentence boundaries (`.`, `!`, `?`, newline); a
/// single sentence over the budget is emitted whole — the answer pipeline's
/// batcher copes with oversized content downstream.
pub fn split_text(
    counter: &dyn TokenCounter,
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let sentences = split_sentences(text);
    let mut chunks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_tokens = 0usize;

    for sentence in sentences {
        let tokens = counter.count_tokens(&sentence);

        if current_tokens + tokens > chunk_size && !current.is_empty() {
            chunks.push(current.concat());

            let mut tail: Vec<String> = Vec::new();
            let mut tail_tokens = 0usize;
            for prior in current.iter().rev() {
                let prior_tokens = counter.count_tokens(prior);
                if tail_tokens + prior_tokens > overlap {
                    break;
                }
                tail_tokens += prior_tokens;
                tail.push(prior.clone());
            }
            tail.reverse();
            current = tail;
            current_tokens = tail_tokens;
        }

        current_tokens += tokens;
        current.push(sentence);
    }

    if !current.is_empty() {
        chunks.push(current.concat());
    }

    chunks
}

/// Splits extracted text and stamps source metadata on every chunk.
pub fn process_document(
    counter: &dyn TokenCounter,
    text: &str,
    file_path: &str,
    file_name: &str,
    upload_time: &str,
) -> Vec<DocumentChunk> {
    let segments = split_text(counter, text, CHUNK_SIZE_TOKENS, CHUNK_OVERLAP_TOKENS);

    let chunks: Vec<DocumentChunk> = segments
        .into_iter()
        .map(|content| {
            let mut metadata = serde_json::Map::new();
            metadata.insert("source".to_string(), json!(file_path));
            metadata.insert("filename".to_string(), json!(file_name));
            metadata.insert("upload_time".to_string(), json!(upload_time));
            DocumentChunk::new(content, metadata)
        })
        .collect();

    tracing::info!("Processed {}: {} chunks", file_name, chunks.len());
    chunks
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?' | '\n') {
            if current.trim().is_empty() {
                current.clear();
            } else {
                sentences.push(std::mem::take(&mut current));
            }
        }
    }

    if !current.trim().is_empty() {
        sentences.push(current);
    }

    sentences
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    struct WordCounter;

    impl TokenCounter for WordCounter {
        fn count_tokens(&self, text: &str) -> usize {
            text.split_whitespace().count()
        }
    }

    #[test]
    fn extracts_plain_text_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::File::create(&path)
            .unwrap()
            .write_all("linha um\nlinha dois".as_bytes())
            .unwrap();

        let text = extract_text(&path).unwrap();
        assert_eq!(text, "linha um\nlinha dois");
    }

    #[test]
    fn rejects_unknown_extensions() {
        let err = extract_text(Path::new("slides.pptx")).unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedFormat(ref e) if e == ".pptx"));
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(split_text(&WordCounter, "   \n ", 10, 2).is_empty());
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = split_text(&WordCounter, "Uma frase curta.", 100, 10);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], "Uma frase curta.");
    }

    #[test]
    fn chunks_respect_the_token_budget() {
        let text = "um dois três. quatro cinco seis. sete oito nove. dez onze doze.";
        let chunks = split_text(&WordCounter, text, 6, 0);

        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(WordCounter.count_tokens(chunk) <= 6, "over budget: {:?}", chunk);
        }
    }

    #[test]
    fn adjacent_chunks_overlap() {
        let text = "primeira frase aqui. segunda frase aqui. terceira frase aqui. quarta frase aqui.";
        let chunks = split_text(&WordCounter, text, 6, 3);

        assert!(chunks.len() >= 2);
        // The sentence that closed one chunk reopens the next.
        let last_sentence_of_first = chunks[0].split(". ").last().unwrap().trim();
        assert!(chunks[1].contains(last_sentence_of_first.trim_end_matches('.')));
    }

    #[test]
    fn oversized_sentence_is_emitted_whole() {
        let long = format!("{} fim.", "palavra ".repeat(20).trim());
        let chunks = split_text(&WordCounter, &long, 5, 0);
        assert!(!chunks.is_empty());
        assert!(chunks.iter().any(|c| WordCounter.count_tokens(c) > 5));
    }

    #[test]
    fn process_document_stamps_metadata() {
        let chunks = process_document(
            &WordCounter,
            "Primeira frase. Segunda frase.",
            "uploads/doc.txt",
            "doc.txt",
            "2025-06-01T12:00:00Z",
        );

        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert_eq!(chunk.source(), Some("uploads/doc.txt"));
            assert_eq!(chunk.metadata.get("filename").unwrap(), "doc.txt");
            assert_eq!(
                chunk.metadata.get("upload_time").unwrap(),
                "2025-06-01T12:00:00Z"
            );
        }
    }
}
