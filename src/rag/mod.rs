//! Retrieval: vector storage and nearest-neighbor lookup over embedded
//! document chunks.

pub mod retriever;
pub mod sqlite;
pub mod store;

pub use retriever::Retriever;
pub use sqlite::SqliteVectorStore;
pub use store::{ChunkSearchResult, DocumentChunk, RagError, VectorStore};
