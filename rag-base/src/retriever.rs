//! Context retriever: query text → embedding → filtered top-k snippets.

use std::sync::Arc;

use tracing::debug;

use crate::embedding::Embedder;
use crate::errors::rag_base_error::RagBaseError;
use crate::structs::rag_store::ContextSnippet;
use crate::vector_db::VectorStore;

pub struct ContextRetriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    top_k: usize,
}

impl ContextRetriever {
    /// `embedder` must be the one used for indexing.
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>, top_k: usize) -> Self {
        Self {
            embedder,
            store,
            top_k: top_k.max(1),
        }
    }

    /// Snippets from `repo_id` nearest to `query`, in store rank order.
    ///
    /// An empty index yields `Ok(vec![])`. Embedding failures surface as
    /// [`RagBaseError::Embedding`] so the caller can decide to continue
    /// without context.
    pub async fn retrieve(
        &self,
        query: &str,
        repo_id: &str,
    ) -> Result<Vec<ContextSnippet>, RagBaseError> {
        let vector = self.embedder.embed(query).await?;
        let hits = self.store.query(vector, self.top_k, repo_id).await?;
        debug!(repo_id, hits = hits.len(), "context retrieved");
        Ok(hits)
    }
}
