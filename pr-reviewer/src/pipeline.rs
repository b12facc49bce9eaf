//! Review job: diff → context → review → comment → record.
//!
//! Each stage is one memoized step, so a resubmitted job continues after the
//! last step that succeeded. Comment posting is guarded only by that
//! memoization.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use git_context_engine::{PostedComment, PullRequestDiff, RepoRef, SourceHost};
use rag_base::{CodebaseIndexer, ContextRetriever, ContextSnippet};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use workflow_engine::{Job, JobClass, JobRun, RetryPolicy};

use crate::accounts::AccountDirectory;
use crate::errors::{ReviewError, ReviewResult};
use crate::generator::ReviewGenerator;
use crate::prompt::build_context_query;
use crate::records::{ReviewRecord, ReviewRecordStore, ReviewStatus};

pub const REVIEW_JOB_KIND: &str = "review";

pub const STEP_FETCH_DIFF: &str = "fetch-diff";
pub const STEP_RETRIEVE_CONTEXT: &str = "retrieve-context";
pub const STEP_GENERATE_REVIEW: &str = "generate-review";
pub const STEP_POST_COMMENT: &str = "post-comment";
pub const STEP_PERSIST_RECORD: &str = "persist-record";

const FAILED_TITLE: &str = "Failed to fetch PR details";

/// Collaborators shared by review and indexing jobs.
pub struct PipelineDeps {
    pub host: Arc<dyn SourceHost>,
    pub directory: Arc<dyn AccountDirectory>,
    pub retriever: Arc<ContextRetriever>,
    pub generator: Arc<ReviewGenerator>,
    pub records: Arc<dyn ReviewRecordStore>,
    pub indexer: Arc<CodebaseIndexer>,
    /// Overrides the engine policy for `generate-review`, typically to add a
    /// per-attempt timeout.
    pub generation_policy: Option<RetryPolicy>,
}

impl PipelineDeps {
    /// Resolves the user's token. Never stored in step payloads.
    pub async fn token(&self, user_id: &str) -> ReviewResult<String> {
        self.directory
            .access_token(user_id)
            .await?
            .ok_or_else(|| ReviewError::CredentialMissing {
                user_id: user_id.to_string(),
            })
    }
}

/// Namespace of a repository in the vector index.
pub fn rag_repo_id(owner: &str, repo: &str) -> String {
    format!("{owner}/{repo}").to_lowercase()
}

/// Serializable identity of a review job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub owner: String,
    pub repo: String,
    pub pr_number: u64,
    pub user_id: String,
}

impl ReviewRequest {
    pub fn job_id(&self) -> String {
        review_job_id(&self.owner, &self.repo, self.pr_number)
    }

    pub fn repo_ref(&self) -> RepoRef {
        RepoRef::new(&self.owner, &self.repo)
    }

    pub fn pr_url(&self) -> String {
        format!(
            "https://github.com/{}/{}/pull/{}",
            self.owner, self.repo, self.pr_number
        )
    }
}

pub fn review_job_id(owner: &str, repo: &str, pr_number: u64) -> String {
    format!("review:{}#{pr_number}", rag_repo_id(owner, repo))
}

/// Result of a completed review job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewSummary {
    pub pr_url: String,
    pub comment: PostedComment,
    pub context_snippets: usize,
    /// `false` when the repository was not registered.
    pub record_written: bool,
}

/// Review state machine as derived from the ledger's stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStage {
    Queued,
    FetchingDiff,
    RetrievingContext,
    GeneratingReview,
    PostingComment,
    PersistingRecord,
    Completed,
    Failed,
}

impl ReviewStage {
    /// Maps a job's `stage` and status to the review state.
    pub fn from_job(stage: &str, status: workflow_engine::JobStatus) -> Self {
        match status {
            workflow_engine::JobStatus::Completed => return ReviewStage::Completed,
            workflow_engine::JobStatus::Failed => return ReviewStage::Failed,
            workflow_engine::JobStatus::Pending => {}
        }
        match stage {
            STEP_FETCH_DIFF => ReviewStage::FetchingDiff,
            STEP_RETRIEVE_CONTEXT => ReviewStage::RetrievingContext,
            STEP_GENERATE_REVIEW => ReviewStage::GeneratingReview,
            STEP_POST_COMMENT => ReviewStage::PostingComment,
            STEP_PERSIST_RECORD => ReviewStage::PersistingRecord,
            _ => ReviewStage::Queued,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ReviewStage::Completed | ReviewStage::Failed)
    }
}

impl fmt::Display for ReviewStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReviewStage::Queued => "queued",
            ReviewStage::FetchingDiff => "fetching_diff",
            ReviewStage::RetrievingContext => "retrieving_context",
            ReviewStage::GeneratingReview => "generating_review",
            ReviewStage::PostingComment => "posting_comment",
            ReviewStage::PersistingRecord => "persisting_record",
            ReviewStage::Completed => "completed",
            ReviewStage::Failed => "failed",
        };
        f.write_str(s)
    }
}

pub struct ReviewJob {
    request: ReviewRequest,
    deps: Arc<PipelineDeps>,
}

impl ReviewJob {
    pub fn new(request: ReviewRequest, deps: Arc<PipelineDeps>) -> Self {
        Self { request, deps }
    }

    pub fn request(&self) -> &ReviewRequest {
        &self.request
    }

    async fn fetch_diff(&self) -> ReviewResult<PullRequestDiff> {
        let token = self.deps.token(&self.request.user_id).await?;
        let pr = self
            .deps
            .host
            .fetch_diff(&self.request.repo_ref(), self.request.pr_number, &token)
            .await?;
        Ok(pr)
    }

    async fn retrieve_context(&self, pr: &PullRequestDiff) -> ReviewResult<Vec<ContextSnippet>> {
        let query = build_context_query(&pr.title, pr.description.as_deref());
        let repo_id = rag_repo_id(&self.request.owner, &self.request.repo);

        match self.deps.retriever.retrieve(&query, &repo_id).await {
            Ok(snippets) => Ok(snippets),
            Err(e) => match ReviewError::from(e) {
                ReviewError::Embedding(msg) => {
                    warn!(repo_id = %repo_id, error = %msg, "query embedding failed, reviewing without context");
                    Ok(Vec::new())
                }
                other => Err(other),
            },
        }
    }

    async fn generate_review(
        &self,
        pr: &PullRequestDiff,
        context: &[ContextSnippet],
    ) -> ReviewResult<String> {
        self.deps
            .generator
            .generate(&pr.title, pr.description.as_deref(), &pr.diff, context)
            .await
    }

    async fn post_comment(&self, review: &str) -> ReviewResult<PostedComment> {
        let token = self.deps.token(&self.request.user_id).await?;
        let comment = self
            .deps
            .host
            .post_comment(&self.request.repo_ref(), self.request.pr_number, review, &token)
            .await?;
        Ok(comment)
    }

    async fn persist_record(&self, pr: &PullRequestDiff, review: &str) -> ReviewResult<bool> {
        let req = &self.request;
        let Some(repository) = self.deps.directory.repository(&req.owner, &req.repo).await? else {
            warn!(repository = %req.repo_ref(), "repository not registered, review record skipped");
            return Ok(false);
        };

        let record = ReviewRecord {
            repository_id: repository.id,
            repository: req.repo_ref().full_name(),
            pr_number: req.pr_number,
            pr_title: pr.title.clone(),
            pr_url: pr_url_of(pr, req),
            review: review.to_string(),
            status: ReviewStatus::Completed,
            created_at: Utc::now(),
        };
        self.deps.records.upsert(&record).await?;
        Ok(true)
    }
}

fn pr_url_of(pr: &PullRequestDiff, req: &ReviewRequest) -> String {
    if pr.html_url.is_empty() {
        req.pr_url()
    } else {
        pr.html_url.clone()
    }
}

#[async_trait]
impl Job for ReviewJob {
    type Output = ReviewSummary;
    type Error = ReviewError;

    fn id(&self) -> String {
        self.request.job_id()
    }

    fn kind(&self) -> &'static str {
        REVIEW_JOB_KIND
    }

    fn class(&self) -> JobClass {
        JobClass::Review
    }

    fn input(&self) -> serde_json::Value {
        serde_json::to_value(&self.request).unwrap_or_default()
    }

    async fn run(&self, run: &JobRun) -> ReviewResult<ReviewSummary> {
        let pr = run.step(STEP_FETCH_DIFF, || self.fetch_diff()).await?;

        let context = run
            .step(STEP_RETRIEVE_CONTEXT, || self.retrieve_context(&pr))
            .await?;

        let review = match &self.deps.generation_policy {
            Some(policy) => {
                run.step_with(STEP_GENERATE_REVIEW, policy, || {
                    self.generate_review(&pr, &context)
                })
                .await?
            }
            None => {
                run.step(STEP_GENERATE_REVIEW, || self.generate_review(&pr, &context))
                    .await?
            }
        };

        let comment = run
            .step(STEP_POST_COMMENT, || self.post_comment(&review))
            .await?;

        let record_written = run
            .step(STEP_PERSIST_RECORD, || self.persist_record(&pr, &review))
            .await?;

        info!(
            job_id = %run.job_id(),
            comment_id = comment.id,
            snippets = context.len(),
            "review published"
        );
        Ok(ReviewSummary {
            pr_url: pr_url_of(&pr, &self.request),
            comment,
            context_snippets: context.len(),
            record_written,
        })
    }

    async fn on_failure(&self, run: &JobRun, error: &ReviewError) {
        let req = &self.request;
        let repository = match self.deps.directory.repository(&req.owner, &req.repo).await {
            Ok(Some(r)) => r,
            Ok(None) => {
                warn!(repository = %req.repo_ref(), error = %error, "review failed for unregistered repository");
                return;
            }
            Err(e) => {
                error!(repository = %req.repo_ref(), error = %e, "could not resolve repository for failed review");
                return;
            }
        };

        let pr = run.memoized::<PullRequestDiff>(STEP_FETCH_DIFF).await;
        let record = ReviewRecord {
            repository_id: repository.id,
            repository: req.repo_ref().full_name(),
            pr_number: req.pr_number,
            pr_title: pr
                .as_ref()
                .map(|p| p.title.clone())
                .unwrap_or_else(|| FAILED_TITLE.to_string()),
            pr_url: pr
                .as_ref()
                .map(|p| pr_url_of(p, req))
                .unwrap_or_else(|| req.pr_url()),
            review: format!("Error: {error}"),
            status: ReviewStatus::Failed,
            created_at: Utc::now(),
        };

        if let Err(e) = self.deps.records.upsert(&record).await {
            error!(job_id = %run.job_id(), error = %e, "could not record failed review");
        }
    }
}
