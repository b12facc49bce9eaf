//! Data types for vector-store interaction: staged records, payload shape,
//! retrieved snippets and indexing statistics.

use serde::{Deserialize, Serialize};

/// One text file offered to the indexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub path: String,
    pub content: String,
}

/// Payload stored alongside the vector in Qdrant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorPayload {
    pub repo_id: String,
    pub path: String,
    /// Chunk ordinal within the file; always 0 since files are not split.
    pub chunk: u32,
    /// File content, truncated to the embedding input limit.
    pub content: String,
}

/// A point ready for upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    /// Deterministic UUIDv5 string.
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: VectorPayload,
}

/// A retrieved code snippet, in store rank order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnippet {
    pub path: String,
    pub content: String,
    pub score: f32,
}

/// Summary statistics for one indexing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub indexed: usize,
    pub failed: usize,
    pub batches: usize,
    pub duration_ms: u128,
}
