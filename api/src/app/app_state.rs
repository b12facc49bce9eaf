use std::sync::Arc;

use ai_llm_service::LlmServiceProfiles;
use git_context_engine::{GitHubClient, WebhookConfig};
use pr_reviewer::{
    FileReviewStore, InMemoryDirectory, LlmGenerationModel, PipelineDeps, ReviewGenerator,
    ReviewService,
};
use rag_base::{CodebaseIndexer, ContextRetriever, LlmEmbedder, QdrantStore, RagConfig};
use tracing::info;
use workflow_engine::{EngineConfig, FileCheckpointStore, RetryPolicy, WorkflowEngine};

use crate::app::app_config::AppConfig;
use crate::error_handler::AppResult;

/// Shared state for all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: ReviewService,
    /// Shared secret checked against `X-Hub-Signature-256`.
    pub webhook_secret: Option<String>,
}

impl AppState {
    pub fn new(service: ReviewService, webhook_secret: Option<String>) -> Self {
        Self {
            service,
            webhook_secret,
        }
    }

    /// Wires the production collaborators: GitHub, Qdrant, the LLM profiles
    /// and the file-backed ledger and record store under `DATA_DIR`.
    pub async fn build(config: &AppConfig) -> AppResult<Self> {
        let llm = Arc::new(LlmServiceProfiles::from_env()?);

        let rag = RagConfig::from_env()?;
        let vectors = Arc::new(QdrantStore::new(&rag)?);
        vectors.ensure_collection().await?;
        let embedder = Arc::new(LlmEmbedder::new(Arc::clone(&llm)));

        let host = Arc::new(GitHubClient::new(
            config.github_api_base.clone(),
            config.github_timeout,
        )?);
        let directory = Arc::new(InMemoryDirectory::load(&config.directory_file).await?);
        let records = Arc::new(FileReviewStore::open(&config.data_dir).await?);
        let ledger = Arc::new(FileCheckpointStore::open(config.data_dir.join("ledger")).await?);

        let engine_cfg = EngineConfig::from_env();
        let generation_policy = config.generation_timeout.map(|t| RetryPolicy {
            attempt_timeout: Some(t),
            ..engine_cfg.retry.clone()
        });

        let deps = Arc::new(PipelineDeps {
            host,
            directory,
            retriever: Arc::new(ContextRetriever::new(
                embedder.clone(),
                vectors.clone(),
                rag.top_k,
            )),
            generator: Arc::new(ReviewGenerator::new(Arc::new(LlmGenerationModel::new(llm)))),
            records,
            indexer: Arc::new(CodebaseIndexer::new(embedder, vectors, &rag)),
            generation_policy,
        });

        let webhook = config.webhook_callback_url.clone().map(|url| WebhookConfig {
            callback_url: url,
            secret: config.webhook_secret.clone(),
        });

        info!(
            data_dir = %config.data_dir.display(),
            review_concurrency = engine_cfg.review_concurrency,
            webhook = webhook.is_some(),
            "application state ready"
        );

        let engine = WorkflowEngine::new(ledger, engine_cfg);
        Ok(Self::new(
            ReviewService::new(engine, deps, webhook),
            config.webhook_secret.clone(),
        ))
    }
}
