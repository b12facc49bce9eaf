//! Retrieval-augmentation for code review.
//!
//! - [`CodebaseIndexer`]: turn a repository's files into vector records.
//! - [`ContextRetriever`]: serve the top-k snippets relevant to a review.
//! - [`VectorStore`] / [`Embedder`]: the external seams (Qdrant, embedding model).

pub mod embedding;
pub mod errors;
pub mod indexer;
pub mod retriever;
pub mod structs;
pub mod vector_db;

pub use embedding::{Embedder, LlmEmbedder};
pub use errors::rag_base_error::RagBaseError;
pub use indexer::CodebaseIndexer;
pub use retriever::ContextRetriever;
pub use structs::rag_base_config::RagConfig;
pub use structs::rag_store::{ContextSnippet, IndexStats, SourceDocument};
pub use vector_db::{InMemoryVectorStore, QdrantStore, VectorStore};
