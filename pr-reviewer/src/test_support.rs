//! Fakes with call counters for the pipeline's external collaborators.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use git_context_engine::errors::GitContextEngineProviderError;
use git_context_engine::{
    GitContextEngineError, GitContextEngineResult, PostedComment, PullRequestDiff, RepoFile,
    RepoRef, SourceHost, Webhook, WebhookConfig,
};
use rag_base::structs::rag_store::{VectorPayload, VectorRecord};
use rag_base::{
    CodebaseIndexer, ContextRetriever, Embedder, InMemoryVectorStore, RagBaseError, RagConfig,
    VectorStore,
};
use workflow_engine::{
    CheckpointStore, EngineConfig, InMemoryCheckpointStore, RetryPolicy, WorkflowEngine,
};

use crate::accounts::{InMemoryDirectory, RepositoryEntry};
use crate::errors::ReviewResult;
use crate::generator::{GenerationModel, ReviewGenerator};
use crate::pipeline::PipelineDeps;
use crate::records::InMemoryReviewStore;
use crate::service::ReviewService;

pub const DIM: usize = 4;

#[derive(Default)]
pub struct FakeHost {
    pub fetch_calls: AtomicU32,
    pub post_calls: AtomicU32,
    pub comments: Mutex<Vec<String>>,
    pub webhooks: Mutex<Vec<Webhook>>,
    pub files: Mutex<Vec<RepoFile>>,
    /// Number of upcoming `post_comment` calls that fail with 401.
    pub reject_posts: AtomicU32,
    pub walk_calls: AtomicU32,
    /// Latency of `walk_tree`.
    pub walk_delay: Mutex<Duration>,
}

impl FakeHost {
    pub fn fetches(&self) -> u32 {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn posts(&self) -> u32 {
        self.post_calls.load(Ordering::SeqCst)
    }

    pub fn walks(&self) -> u32 {
        self.walk_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceHost for FakeHost {
    async fn fetch_diff(
        &self,
        repo: &RepoRef,
        pr_number: u64,
        _token: &str,
    ) -> GitContextEngineResult<PullRequestDiff> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(PullRequestDiff {
            title: "Add feature".into(),
            description: Some("Adds the feature".into()),
            diff: "diff --git a/src/lib.rs b/src/lib.rs\n+pub fn feature() {}\n".into(),
            html_url: format!("https://github.com/{}/pull/{pr_number}", repo.full_name()),
            head_sha: "abc123".into(),
        })
    }

    async fn walk_tree(
        &self,
        _repo: &RepoRef,
        _token: &str,
    ) -> GitContextEngineResult<BoxStream<'static, RepoFile>> {
        self.walk_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.walk_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let files = self.files.lock().unwrap().clone();
        Ok(futures::stream::iter(files).boxed())
    }

    async fn post_comment(
        &self,
        _repo: &RepoRef,
        _pr_number: u64,
        body: &str,
        _token: &str,
    ) -> GitContextEngineResult<PostedComment> {
        self.post_calls.fetch_add(1, Ordering::SeqCst);
        let rejected = self
            .reject_posts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(GitContextEngineError::from(
                GitContextEngineProviderError::Unauthorized,
            ));
        }

        let mut comments = self.comments.lock().unwrap();
        comments.push(body.to_string());
        Ok(PostedComment {
            id: comments.len() as u64,
            html_url: format!("https://github.com/octo/repo/pull/42#issuecomment-{}", comments.len()),
        })
    }

    async fn ensure_webhook(
        &self,
        _repo: &RepoRef,
        cfg: &WebhookConfig,
        _token: &str,
    ) -> GitContextEngineResult<Webhook> {
        let mut hooks = self.webhooks.lock().unwrap();
        if let Some(h) = hooks.iter().find(|h| h.url == cfg.callback_url) {
            return Ok(Webhook {
                created: false,
                ..h.clone()
            });
        }
        let hook = Webhook {
            id: hooks.len() as u64 + 1,
            url: cfg.callback_url.clone(),
            created: true,
        };
        hooks.push(hook.clone());
        Ok(hook)
    }

    async fn remove_webhook(
        &self,
        _repo: &RepoRef,
        callback_url: &str,
        _token: &str,
    ) -> GitContextEngineResult<usize> {
        let mut hooks = self.webhooks.lock().unwrap();
        let before = hooks.len();
        hooks.retain(|h| h.url != callback_url);
        Ok(before - hooks.len())
    }
}

/// Model whose latency can be changed between runs.
#[derive(Default)]
pub struct FakeModel {
    pub calls: AtomicU32,
    pub delay: Mutex<Duration>,
    pub prompts: Mutex<Vec<String>>,
}

impl FakeModel {
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }
}

#[async_trait]
impl GenerationModel for FakeModel {
    async fn complete(&self, prompt: &str) -> ReviewResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok("## 1. Walkthrough\nLooks fine.".to_string())
    }
}

/// Deterministic embedder; every text maps to a non-zero vector.
#[derive(Default)]
pub struct FakeEmbedder {
    pub calls: AtomicU32,
    pub fail: std::sync::atomic::AtomicBool,
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagBaseError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(RagBaseError::Embedding("embedding backend down".into()));
        }
        Ok(vec![1.0, (text.len() % 7) as f32, 0.5, 0.25])
    }
}

pub struct Harness {
    pub host: Arc<FakeHost>,
    pub model: Arc<FakeModel>,
    pub embedder: Arc<FakeEmbedder>,
    pub vectors: Arc<InMemoryVectorStore>,
    pub directory: Arc<InMemoryDirectory>,
    pub records: Arc<InMemoryReviewStore>,
    pub ledger: Arc<dyn CheckpointStore>,
    pub deps: Arc<PipelineDeps>,
    pub service: ReviewService,
}

pub fn engine_config() -> EngineConfig {
    EngineConfig {
        review_concurrency: 5,
        job_deadline: Duration::from_secs(30),
        lease_ttl: Duration::from_secs(60),
        retry: RetryPolicy {
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            ..RetryPolicy::default()
        },
        instance_id: "engine-test".to_string(),
    }
}

pub struct HarnessBuilder {
    ledger: Arc<dyn CheckpointStore>,
    host: Arc<FakeHost>,
    model: Arc<FakeModel>,
    records: Arc<InMemoryReviewStore>,
    generation_policy: Option<RetryPolicy>,
    webhook: Option<WebhookConfig>,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            ledger: Arc::new(InMemoryCheckpointStore::new()),
            host: Arc::new(FakeHost::default()),
            model: Arc::new(FakeModel::default()),
            records: Arc::new(InMemoryReviewStore::new()),
            generation_policy: None,
            webhook: None,
        }
    }

    pub fn ledger(mut self, ledger: Arc<dyn CheckpointStore>) -> Self {
        self.ledger = ledger;
        self
    }

    /// Reuses collaborators from an earlier harness, as after a restart.
    pub fn sharing(mut self, other: &Harness) -> Self {
        self.host = Arc::clone(&other.host);
        self.model = Arc::clone(&other.model);
        self.records = Arc::clone(&other.records);
        self
    }

    pub fn generation_policy(mut self, policy: RetryPolicy) -> Self {
        self.generation_policy = Some(policy);
        self
    }

    pub fn webhook(mut self, url: &str) -> Self {
        self.webhook = Some(WebhookConfig {
            callback_url: url.to_string(),
            secret: None,
        });
        self
    }

    pub async fn build(self) -> Harness {
        let directory = Arc::new(InMemoryDirectory::new());
        directory
            .put_repository(RepositoryEntry {
                id: "repo-1".into(),
                owner: "octo".into(),
                name: "repo".into(),
                user_id: "user-1".into(),
            })
            .await;
        directory.put_token("user-1", "gh-token").await;

        let mut rag = RagConfig::default();
        rag.embedding.dim = DIM;

        let embedder = Arc::new(FakeEmbedder::default());
        let vectors = Arc::new(InMemoryVectorStore::new());
        let retriever = ContextRetriever::new(embedder.clone(), vectors.clone(), rag.top_k);
        let indexer = CodebaseIndexer::new(embedder.clone(), vectors.clone(), &rag);

        let deps = Arc::new(PipelineDeps {
            host: self.host.clone(),
            directory: directory.clone(),
            retriever: Arc::new(retriever),
            generator: Arc::new(ReviewGenerator::new(self.model.clone())),
            records: self.records.clone(),
            indexer: Arc::new(indexer),
            generation_policy: self.generation_policy,
        });

        let engine = WorkflowEngine::new(Arc::clone(&self.ledger), engine_config());
        let service = ReviewService::new(engine, Arc::clone(&deps), self.webhook);

        Harness {
            host: self.host,
            model: self.model,
            embedder,
            vectors,
            directory,
            records: self.records,
            ledger: self.ledger,
            deps,
            service,
        }
    }
}

impl Harness {
    /// Stores `paths` as indexed snippets of `octo/repo`.
    pub async fn seed_snippets(&self, paths: &[&str]) {
        let records = paths
            .iter()
            .map(|p| VectorRecord {
                id: format!("seed-{p}"),
                vector: vec![1.0, 0.0, 0.5, 0.25],
                payload: VectorPayload {
                    repo_id: "octo/repo".into(),
                    path: p.to_string(),
                    chunk: 0,
                    content: format!("File Path: {p}\n\nfn seeded() {{}}"),
                },
            })
            .collect();
        self.vectors.upsert(records).await.unwrap();
    }
}

pub fn request_42() -> crate::pipeline::ReviewRequest {
    crate::pipeline::ReviewRequest {
        owner: "octo".into(),
        repo: "repo".into(),
        pr_number: 42,
        user_id: "user-1".into(),
    }
}

pub fn embed_calls(h: &Harness) -> u32 {
    h.embedder.calls.load(Ordering::SeqCst)
}
