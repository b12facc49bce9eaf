//! Repository indexing job: walk the default branch and feed the indexer.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use rag_base::{IndexStats, SourceDocument};
use serde::{Deserialize, Serialize};
use tracing::info;
use workflow_engine::{Job, JobClass, JobRun};

use crate::errors::{ReviewError, ReviewResult};
use crate::pipeline::{PipelineDeps, rag_repo_id};

pub const INDEX_JOB_KIND: &str = "index";
pub const STEP_INDEX_CODEBASE: &str = "index-codebase";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRequest {
    pub owner: String,
    pub repo: String,
    pub user_id: String,
    /// Distinguishes successive indexing runs of one repository.
    pub run_id: String,
}

impl IndexRequest {
    pub fn new(owner: &str, repo: &str, user_id: &str) -> Self {
        Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            user_id: user_id.to_string(),
            run_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn job_id(&self) -> String {
        format!("index:{}/{}:{}", self.owner, self.repo, self.run_id)
    }

    /// One indexing run per repository at a time.
    pub fn lock_key(&self) -> String {
        format!("index:{}/{}", self.owner, self.repo).to_lowercase()
    }
}

pub struct IndexRepositoryJob {
    request: IndexRequest,
    deps: Arc<PipelineDeps>,
}

impl IndexRepositoryJob {
    pub fn new(request: IndexRequest, deps: Arc<PipelineDeps>) -> Self {
        Self { request, deps }
    }

    async fn index_codebase(&self) -> ReviewResult<IndexStats> {
        let req = &self.request;
        let token = self.deps.token(&req.user_id).await?;
        let repo = git_context_engine::RepoRef::new(&req.owner, &req.repo);

        let files = self.deps.host.walk_tree(&repo, &token).await?;
        let documents = files.map(|f| SourceDocument {
            path: f.path,
            content: f.content,
        });

        let stats = self
            .deps
            .indexer
            .index(&rag_repo_id(&req.owner, &req.repo), documents)
            .await?;
        Ok(stats)
    }
}

#[async_trait]
impl Job for IndexRepositoryJob {
    type Output = IndexStats;
    type Error = ReviewError;

    fn id(&self) -> String {
        self.request.job_id()
    }

    fn lock_key(&self) -> String {
        self.request.lock_key()
    }

    fn kind(&self) -> &'static str {
        INDEX_JOB_KIND
    }

    fn class(&self) -> JobClass {
        JobClass::Indexing
    }

    fn input(&self) -> serde_json::Value {
        serde_json::to_value(&self.request).unwrap_or_default()
    }

    async fn run(&self, run: &JobRun) -> ReviewResult<IndexStats> {
        let stats = run
            .step(STEP_INDEX_CODEBASE, || self.index_codebase())
            .await?;
        info!(
            job_id = %run.job_id(),
            indexed = stats.indexed,
            failed = stats.failed,
            batches = stats.batches,
            duration_ms = stats.duration_ms as u64,
            "repository indexed"
        );
        Ok(stats)
    }
}
