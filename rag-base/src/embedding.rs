//! Embedding seam and document shaping.

use std::sync::Arc;

use ai_llm_service::LlmServiceProfiles;
use async_trait::async_trait;

use crate::errors::rag_base_error::RagBaseError;

/// Turns text into a dense vector. Indexing and retrieval share one instance.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagBaseError>;
}

/// [`Embedder`] backed by the embedding profile of [`LlmServiceProfiles`].
#[derive(Clone)]
pub struct LlmEmbedder {
    llm: Arc<LlmServiceProfiles>,
}

impl LlmEmbedder {
    pub fn new(llm: Arc<LlmServiceProfiles>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Embedder for LlmEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagBaseError> {
        Ok(self.llm.embed(text).await?)
    }
}

/// Returns the longest prefix of `s` that fits in `max_bytes` without
/// splitting a UTF-8 character.
pub fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Embedding input for one file: a path header followed by the content,
/// truncated to `max_bytes`.
pub fn build_document(path: &str, content: &str, max_bytes: usize) -> String {
    let doc = format!("File Path: {path}\n\n{content}");
    truncate_utf8(&doc, max_bytes).to_string()
}
