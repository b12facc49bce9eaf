//! Configuration layer: reads runtime settings from environment variables
//! and exposes strongly typed configs for embeddings, Qdrant, indexing and search.

use serde::{Deserialize, Serialize};

use crate::errors::rag_base_error::RagBaseError;

/// Distance metric supported by Qdrant for primary vector space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum DistanceMetric {
    Cosine,
    Dot,
    Euclid,
}

impl DistanceMetric {
    /// Parse from env string (case-insensitive). Defaults to Cosine.
    pub fn from_env(s: Option<String>) -> Self {
        match s
            .unwrap_or_else(|| "Cosine".to_string())
            .to_lowercase()
            .as_str()
        {
            "dot" | "dotproduct" => DistanceMetric::Dot,
            "euclid" | "l2" => DistanceMetric::Euclid,
            _ => DistanceMetric::Cosine,
        }
    }
}

/// Embedding input shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding vector dimensionality (e.g., 1024 for bge-m3).
    pub dim: usize,
    /// Documents are truncated to this many bytes before embedding.
    pub max_input_bytes: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dim: 1024,
            max_input_bytes: 8000,
        }
    }
}

/// Qdrant connectivity and collection parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QdrantConfig {
    /// gRPC URL for Qdrant (e.g., "http://localhost:6334").
    pub url: String,
    pub api_key: Option<String>,
    pub collection: String,
    pub distance: DistanceMetric,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6334".to_string(),
            api_key: None,
            collection: "code_critic".to_string(),
            distance: DistanceMetric::Cosine,
        }
    }
}

/// Top-level runtime configuration for the RAG module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagConfig {
    pub embedding: EmbeddingConfig,
    pub qdrant: QdrantConfig,
    /// Records staged per upsert.
    pub batch_size: usize,
    /// Snippets returned per retrieval.
    pub top_k: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            embedding: EmbeddingConfig::default(),
            qdrant: QdrantConfig::default(),
            batch_size: 100,
            top_k: 5,
        }
    }
}

impl RagConfig {
    /// Build configuration from environment variables.
    ///
    /// Environment variables used:
    /// - `QDRANT_URL` (default: "http://localhost:6334")
    /// - `QDRANT_API_KEY` (optional)
    /// - `QDRANT_COLLECTION` (default: "code_critic")
    /// - `QDRANT_DISTANCE` (values: "Cosine" | "Dot" | "Euclid"; default: "Cosine")
    /// - `EMBEDDING_DIM` (default: 1024)
    /// - `EMBED_MAX_BYTES` (default: 8000)
    /// - `INDEX_BATCH_SIZE` (default: 100)
    /// - `RAG_TOP_K` (default: 5)
    pub fn from_env() -> Result<Self, RagBaseError> {
        let d = Self::default();

        let embedding = EmbeddingConfig {
            dim: read_usize_env("EMBEDDING_DIM")?.unwrap_or(d.embedding.dim),
            max_input_bytes: read_usize_env("EMBED_MAX_BYTES")?
                .unwrap_or(d.embedding.max_input_bytes),
        };

        let qdrant = QdrantConfig {
            url: read_string_env("QDRANT_URL").unwrap_or(d.qdrant.url),
            api_key: read_string_env("QDRANT_API_KEY"),
            collection: read_string_env("QDRANT_COLLECTION").unwrap_or(d.qdrant.collection),
            distance: DistanceMetric::from_env(read_string_env("QDRANT_DISTANCE")),
        };

        let cfg = Self {
            embedding,
            qdrant,
            batch_size: read_usize_env("INDEX_BATCH_SIZE")?.unwrap_or(d.batch_size),
            top_k: read_usize_env("RAG_TOP_K")?.unwrap_or(d.top_k),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), RagBaseError> {
        if self.embedding.dim == 0 {
            return Err(RagBaseError::InvalidConfig("EMBEDDING_DIM must be > 0".into()));
        }
        if self.embedding.max_input_bytes == 0 {
            return Err(RagBaseError::InvalidConfig("EMBED_MAX_BYTES must be > 0".into()));
        }
        if self.batch_size == 0 {
            return Err(RagBaseError::InvalidConfig("INDEX_BATCH_SIZE must be > 0".into()));
        }
        if self.top_k == 0 {
            return Err(RagBaseError::InvalidConfig("RAG_TOP_K must be > 0".into()));
        }
        Ok(())
    }
}

fn read_string_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Read an optional `usize` from env; a present but malformed value is an error.
fn read_usize_env(key: &str) -> Result<Option<usize>, RagBaseError> {
    match read_string_env(key) {
        Some(v) => v
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|_| RagBaseError::EnvParse {
                key: key.into(),
                value: v,
            }),
        None => Ok(None),
    }
}
