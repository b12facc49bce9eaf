//! Unified error type for the rag-base crate.

use thiserror::Error;

/// Errors produced by the RAG base module.
#[derive(Debug, Error)]
pub enum RagBaseError {
    // ── Configuration / environment ──────────────────────────────────────────
    /// Failed to parse an environment variable into the expected type.
    #[error("failed to parse env variable: {key} = '{value}'")]
    EnvParse { key: String, value: String },

    /// Configuration combination is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Qdrant client / transport ───────────────────────────────────────────
    /// Transport / server error from the vector store.
    #[error("qdrant error: {0}")]
    Qdrant(String),

    /// Vector length does not match the collection dimension.
    #[error("vector dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    // ── Embeddings backend ──────────────────────────────────────────────────
    /// Embedding backend failed to embed an input.
    #[error("embedding error: {0}")]
    Embedding(String),
}

impl RagBaseError {
    /// Store and embedding outages are worth retrying; bad config is not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RagBaseError::Qdrant(_) | RagBaseError::Embedding(_))
    }
}

impl From<qdrant_client::QdrantError> for RagBaseError {
    fn from(e: qdrant_client::QdrantError) -> Self {
        RagBaseError::Qdrant(e.to_string())
    }
}

impl From<ai_llm_service::AiLlmError> for RagBaseError {
    fn from(e: ai_llm_service::AiLlmError) -> Self {
        RagBaseError::Embedding(e.to_string())
    }
}
