//! Vector store seam and its Qdrant implementation.
//!
//! - [`VectorStore`]: keyed upsert and filtered top-k query.
//! - [`QdrantStore`]: gRPC client, collection bootstrap, `repo_id` keyword index.
//! - [`InMemoryVectorStore`]: brute-force cosine store for tests and local runs.

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, Distance, FieldType,
    Filter, PointStruct, ScoredPoint, SearchPointsBuilder, UpsertPointsBuilder,
    VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::errors::rag_base_error::RagBaseError;
use crate::structs::rag_base_config::{DistanceMetric, RagConfig};
use crate::structs::rag_store::{ContextSnippet, VectorRecord};

/// Storage for embedded code.
///
/// Upserts are keyed by record id, so repeating one is harmless.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Writes records and returns how many were acknowledged.
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize, RagBaseError>;

    /// Top-k nearest records whose `repo_id` equals `repo_id`, best first.
    async fn query(
        &self,
        vector: Vec<f32>,
        top_k: usize,
        repo_id: &str,
    ) -> Result<Vec<ContextSnippet>, RagBaseError>;
}

/// Qdrant-backed [`VectorStore`].
pub struct QdrantStore {
    client: Qdrant,
    collection: String,
    dim: usize,
    distance: DistanceMetric,
}

impl QdrantStore {
    /// Builds the gRPC client. Does not touch any collection.
    pub fn new(cfg: &RagConfig) -> Result<Self, RagBaseError> {
        cfg.validate()?;

        let mut builder = Qdrant::from_url(&cfg.qdrant.url);
        if let Some(key) = &cfg.qdrant.api_key {
            builder = builder.api_key(key.clone());
        }
        let client = builder
            .build()
            .map_err(|e| RagBaseError::Qdrant(format!("client build: {e}")))?;

        Ok(Self {
            client,
            collection: cfg.qdrant.collection.clone(),
            dim: cfg.embedding.dim,
            distance: cfg.qdrant.distance,
        })
    }

    /// Creates the collection and its `repo_id` payload index when missing.
    pub async fn ensure_collection(&self) -> Result<(), RagBaseError> {
        if self.client.collection_exists(&self.collection).await? {
            debug!(collection = %self.collection, "collection already exists");
            return Ok(());
        }

        let distance = match self.distance {
            DistanceMetric::Cosine => Distance::Cosine,
            DistanceMetric::Dot => Distance::Dot,
            DistanceMetric::Euclid => Distance::Euclid,
        };

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(self.dim as u64, distance)),
            )
            .await?;

        self.client
            .create_field_index(
                CreateFieldIndexCollectionBuilder::new(
                    &self.collection,
                    "repo_id",
                    FieldType::Keyword,
                )
                .wait(true),
            )
            .await?;

        info!(collection = %self.collection, dim = self.dim, "collection created");
        Ok(())
    }

    fn check_dim(&self, got: usize) -> Result<(), RagBaseError> {
        if got != self.dim {
            return Err(RagBaseError::DimensionMismatch {
                expected: self.dim,
                got,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    #[instrument(skip_all, fields(collection = %self.collection, count = records.len()))]
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize, RagBaseError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut points = Vec::with_capacity(records.len());
        for r in records {
            self.check_dim(r.vector.len())?;
            let payload: Payload = json!({
                "repo_id": r.payload.repo_id,
                "path": r.payload.path,
                "chunk": r.payload.chunk,
                "content": r.payload.content,
            })
            .try_into()
            .map_err(|e| RagBaseError::Qdrant(format!("payload convert: {e}")))?;
            points.push(PointStruct::new(r.id, r.vector, payload));
        }

        let written = points.len();
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await?;
        debug!(written, "points upserted");
        Ok(written)
    }

    #[instrument(skip_all, fields(collection = %self.collection, %repo_id, top_k))]
    async fn query(
        &self,
        vector: Vec<f32>,
        top_k: usize,
        repo_id: &str,
    ) -> Result<Vec<ContextSnippet>, RagBaseError> {
        self.check_dim(vector.len())?;

        let filter = Filter::must([Condition::matches("repo_id", repo_id.to_string())]);
        let resp = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, vector, top_k as u64)
                    .filter(filter)
                    .with_payload(true),
            )
            .await?;

        Ok(resp.result.into_iter().map(snippet_from_point).collect())
    }
}

/// Maps a `ScoredPoint` into a [`ContextSnippet`], reading payload best-effort.
fn snippet_from_point(sp: ScoredPoint) -> ContextSnippet {
    let read = |key: &str| -> String {
        match sp.payload.get(key).map(|v| v.clone().into_json()) {
            Some(serde_json::Value::String(s)) => s,
            _ => String::new(),
        }
    };

    ContextSnippet {
        path: read("path"),
        content: read("content"),
        score: sp.score,
    }
}

/// Brute-force cosine [`VectorStore`] held in memory.
#[derive(Default)]
pub struct InMemoryVectorStore {
    points: RwLock<HashMap<String, VectorRecord>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.points.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.points.read().await.is_empty()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na * nb) }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize, RagBaseError> {
        let n = records.len();
        let mut points = self.points.write().await;
        for r in records {
            points.insert(r.id.clone(), r);
        }
        Ok(n)
    }

    async fn query(
        &self,
        vector: Vec<f32>,
        top_k: usize,
        repo_id: &str,
    ) -> Result<Vec<ContextSnippet>, RagBaseError> {
        let points = self.points.read().await;
        let mut hits: Vec<ContextSnippet> = points
            .values()
            .filter(|r| r.payload.repo_id == repo_id)
            .map(|r| ContextSnippet {
                path: r.payload.path.clone(),
                content: r.payload.content.clone(),
                score: cosine(&vector, &r.vector),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::rag_store::VectorPayload;

    fn record(id: &str, repo: &str, path: &str, vector: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: id.into(),
            vector,
            payload: VectorPayload {
                repo_id: repo.into(),
                path: path.into(),
                chunk: 0,
                content: format!("// {path}"),
            },
        }
    }

    #[tokio::test]
    async fn memory_store_filters_by_repo_and_ranks() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(vec![
                record("1", "octo/repo", "a.rs", vec![1.0, 0.0]),
                record("2", "octo/repo", "b.rs", vec![0.6, 0.8]),
                record("3", "octo/other", "c.rs", vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let hits = store.query(vec![1.0, 0.0], 5, "octo/repo").await.unwrap();
        let paths: Vec<&str> = hits.iter().map(|h| h.path.as_str()).collect();
        assert_eq!(paths, vec!["a.rs", "b.rs"]);
    }

    #[tokio::test]
    async fn upsert_overwrites_same_id() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(vec![record("1", "r", "a.rs", vec![1.0])])
            .await
            .unwrap();
        store
            .upsert(vec![record("1", "r", "a.rs", vec![0.5])])
            .await
            .unwrap();
        assert_eq!(store.len().await, 1);
    }
}
