//! Codebase indexer: stream of files → documents → embeddings → batched upserts.

use std::sync::Arc;
use std::time::Instant;

use futures::{Stream, StreamExt};
use services::chunk_point_id;
use tracing::{debug, info, warn};

use crate::embedding::{Embedder, build_document, truncate_utf8};
use crate::errors::rag_base_error::RagBaseError;
use crate::structs::rag_base_config::RagConfig;
use crate::structs::rag_store::{IndexStats, SourceDocument, VectorPayload, VectorRecord};
use crate::vector_db::VectorStore;

/// Embeds every file of a repository and writes it to the vector store.
///
/// Per-file embedding failures are logged and counted. Store failures abort
/// the run; records flushed before the failure stay written, and a rerun
/// overwrites them thanks to deterministic ids.
pub struct CodebaseIndexer {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    dim: usize,
    max_input_bytes: usize,
    batch_size: usize,
}

impl CodebaseIndexer {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>, cfg: &RagConfig) -> Self {
        Self {
            embedder,
            store,
            dim: cfg.embedding.dim,
            max_input_bytes: cfg.embedding.max_input_bytes,
            batch_size: cfg.batch_size.max(1),
        }
    }

    pub async fn index<S>(&self, repo_id: &str, files: S) -> Result<IndexStats, RagBaseError>
    where
        S: Stream<Item = SourceDocument> + Send,
    {
        let started = Instant::now();
        let mut stats = IndexStats::default();
        let mut staged: Vec<VectorRecord> = Vec::with_capacity(self.batch_size);

        futures::pin_mut!(files);
        while let Some(file) = files.next().await {
            let text = build_document(&file.path, &file.content, self.max_input_bytes);

            match self.embedder.embed(&text).await {
                Ok(vector) if vector.len() == self.dim => {
                    staged.push(VectorRecord {
                        id: chunk_point_id(repo_id, &file.path, 0).to_string(),
                        vector,
                        payload: VectorPayload {
                            repo_id: repo_id.to_string(),
                            path: file.path,
                            chunk: 0,
                            content: truncate_utf8(&file.content, self.max_input_bytes)
                                .to_string(),
                        },
                    });
                }
                Ok(vector) => {
                    warn!(
                        path = %file.path,
                        expected = self.dim,
                        got = vector.len(),
                        "embedding has wrong dimension, skipping file"
                    );
                    stats.failed += 1;
                }
                Err(e) => {
                    warn!(path = %file.path, error = %e, "embedding failed, skipping file");
                    stats.failed += 1;
                }
            }

            if staged.len() >= self.batch_size {
                self.flush(&mut staged, &mut stats).await?;
            }
        }

        if !staged.is_empty() {
            self.flush(&mut staged, &mut stats).await?;
        }

        stats.duration_ms = started.elapsed().as_millis();
        info!(
            repo_id,
            indexed = stats.indexed,
            failed = stats.failed,
            batches = stats.batches,
            duration_ms = stats.duration_ms,
            "indexing finished"
        );
        Ok(stats)
    }

    async fn flush(
        &self,
        staged: &mut Vec<VectorRecord>,
        stats: &mut IndexStats,
    ) -> Result<(), RagBaseError> {
        let batch = std::mem::replace(staged, Vec::with_capacity(self.batch_size));
        let written = self.store.upsert(batch).await?;
        stats.indexed += written;
        stats.batches += 1;
        debug!(written, batch = stats.batches, "batch upserted");
        Ok(())
    }
}
