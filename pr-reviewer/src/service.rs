//! Facade used by the HTTP layer: turns events into jobs and answers queries.

use std::sync::Arc;

use git_context_engine::{RepoRef, Webhook, WebhookConfig};
use rag_base::IndexStats;
use serde::Serialize;
use tracing::{info, warn};
use workflow_engine::{JobHandle, JobRecord, WorkflowEngine};

use crate::errors::ReviewResult;
use crate::events::{InboundEvent, split_full_name};
use crate::indexing::{INDEX_JOB_KIND, IndexRepositoryJob, IndexRequest};
use crate::pipeline::{
    PipelineDeps, REVIEW_JOB_KIND, ReviewJob, ReviewRequest, ReviewStage, ReviewSummary,
    review_job_id,
};
use crate::records::ReviewRecord;

/// Upper bound on records returned by [`ReviewService::list_reviews`].
pub const MAX_REVIEW_LIST: usize = 50;

/// What happened to an inbound event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "disposition", rename_all = "snake_case")]
pub enum EventDisposition {
    Submitted { job_id: String },
    Ignored { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectOutcome {
    pub webhook: Option<Webhook>,
    pub index_job_id: String,
}

/// Ledger state and record of one pull request review.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewStatusView {
    pub job_id: String,
    pub stage: Option<ReviewStage>,
    pub run: Option<u32>,
    pub error: Option<String>,
    pub record: Option<ReviewRecord>,
}

#[derive(Clone)]
pub struct ReviewService {
    engine: WorkflowEngine,
    deps: Arc<PipelineDeps>,
    webhook: Option<WebhookConfig>,
}

impl ReviewService {
    /// `webhook` is registered on connect when set.
    pub fn new(
        engine: WorkflowEngine,
        deps: Arc<PipelineDeps>,
        webhook: Option<WebhookConfig>,
    ) -> Self {
        Self {
            engine,
            deps,
            webhook,
        }
    }

    pub fn engine(&self) -> &WorkflowEngine {
        &self.engine
    }

    /// Validates the event and submits the matching job without waiting on it.
    pub async fn handle_event(&self, event: InboundEvent) -> ReviewResult<EventDisposition> {
        event.validate()?;

        match event {
            InboundEvent::PullRequest {
                ref action,
                ref repository_full_name,
                pr_number,
            } => {
                if !event.requests_review() {
                    return Ok(EventDisposition::Ignored {
                        reason: format!("pull_request action `{action}` does not trigger a review"),
                    });
                }
                let (owner, repo) = split_full_name(repository_full_name)?;
                let Some(entry) = self.deps.directory.repository(owner, repo).await? else {
                    info!(repository = %repository_full_name, "event for unregistered repository ignored");
                    return Ok(EventDisposition::Ignored {
                        reason: format!("repository {repository_full_name} is not connected"),
                    });
                };

                let handle = self.submit_review(ReviewRequest {
                    owner: owner.to_string(),
                    repo: repo.to_string(),
                    pr_number,
                    user_id: entry.user_id,
                });
                Ok(EventDisposition::Submitted {
                    job_id: handle.job_id().to_string(),
                })
            }
            InboundEvent::RepositoryConnected {
                owner,
                repo,
                user_id,
            } => {
                let handle = self.submit_index(IndexRequest::new(&owner, &repo, &user_id));
                Ok(EventDisposition::Submitted {
                    job_id: handle.job_id().to_string(),
                })
            }
        }
    }

    pub fn submit_review(&self, request: ReviewRequest) -> JobHandle<ReviewSummary> {
        info!(job_id = %request.job_id(), user_id = %request.user_id, "review submitted");
        self.engine
            .submit(ReviewJob::new(request, Arc::clone(&self.deps)))
    }

    pub fn submit_index(&self, request: IndexRequest) -> JobHandle<IndexStats> {
        info!(job_id = %request.job_id(), "indexing submitted");
        self.engine
            .submit(IndexRepositoryJob::new(request, Arc::clone(&self.deps)))
    }

    /// Registers the review webhook (when configured) and starts indexing.
    pub async fn connect_repository(
        &self,
        owner: &str,
        repo: &str,
        user_id: &str,
    ) -> ReviewResult<ConnectOutcome> {
        let token = self.deps.token(user_id).await?;
        let repo_ref = RepoRef::new(owner, repo);

        let webhook = match &self.webhook {
            Some(cfg) => Some(self.deps.host.ensure_webhook(&repo_ref, cfg, &token).await?),
            None => {
                warn!(repository = %repo_ref, "no webhook callback configured, skipping registration");
                None
            }
        };

        let handle = self.submit_index(IndexRequest::new(owner, repo, user_id));
        Ok(ConnectOutcome {
            webhook,
            index_job_id: handle.job_id().to_string(),
        })
    }

    /// Removes the review webhook. Returns how many hooks were deleted.
    pub async fn disconnect_repository(
        &self,
        owner: &str,
        repo: &str,
        user_id: &str,
    ) -> ReviewResult<usize> {
        let Some(cfg) = &self.webhook else {
            return Ok(0);
        };
        let token = self.deps.token(user_id).await?;
        let removed = self
            .deps
            .host
            .remove_webhook(&RepoRef::new(owner, repo), &cfg.callback_url, &token)
            .await?;
        info!(repository = %format!("{owner}/{repo}"), removed, "repository disconnected");
        Ok(removed)
    }

    /// Re-submits jobs that were still pending when the process stopped.
    ///
    /// A job whose lease is still held by another owner starts once that
    /// lease expires.
    pub async fn resume_unfinished(&self) -> ReviewResult<usize> {
        let store = self.engine.store();
        let mut resumed = 0;

        for record in store.list_unfinished(REVIEW_JOB_KIND).await? {
            match serde_json::from_value::<ReviewRequest>(record.input.clone()) {
                Ok(request) => {
                    self.engine
                        .resume(ReviewJob::new(request, Arc::clone(&self.deps)));
                    resumed += 1;
                }
                Err(e) => warn!(job_id = %record.job_id, error = %e, "cannot resume review job"),
            }
        }
        for record in store.list_unfinished(INDEX_JOB_KIND).await? {
            match serde_json::from_value::<IndexRequest>(record.input.clone()) {
                Ok(request) => {
                    self.engine
                        .resume(IndexRepositoryJob::new(request, Arc::clone(&self.deps)));
                    resumed += 1;
                }
                Err(e) => warn!(job_id = %record.job_id, error = %e, "cannot resume indexing job"),
            }
        }

        if resumed > 0 {
            info!(resumed, "unfinished jobs resubmitted");
        }
        Ok(resumed)
    }

    pub async fn review_record(
        &self,
        owner: &str,
        repo: &str,
        pr_number: u64,
    ) -> ReviewResult<Option<ReviewRecord>> {
        self.deps
            .records
            .get(&format!("{owner}/{repo}"), pr_number)
            .await
    }

    /// Review records of one repository, newest first, at most `limit`
    /// (capped at [`MAX_REVIEW_LIST`]).
    pub async fn list_reviews(
        &self,
        owner: &str,
        repo: &str,
        limit: usize,
    ) -> ReviewResult<Vec<ReviewRecord>> {
        let mut records = self.deps.records.list(&format!("{owner}/{repo}")).await?;
        records.truncate(limit.min(MAX_REVIEW_LIST));
        Ok(records)
    }

    pub async fn review_status(
        &self,
        owner: &str,
        repo: &str,
        pr_number: u64,
    ) -> ReviewResult<ReviewStatusView> {
        let job_id = review_job_id(owner, repo, pr_number);
        let job: Option<JobRecord> = self.engine.store().load_job(&job_id).await?;
        let record = self.review_record(owner, repo, pr_number).await?;

        Ok(ReviewStatusView {
            job_id,
            stage: job.as_ref().map(|j| ReviewStage::from_job(&j.stage, j.status)),
            run: job.as_ref().map(|j| j.run),
            error: job.and_then(|j| j.error),
            record,
        })
    }
}

#[cfg(test)]
mod tests {
    use git_context_engine::RepoFile;
    use workflow_engine::JobOutcome;

    use super::*;
    use crate::test_support::HarnessBuilder;

    const CALLBACK: &str = "https://critic.example.com/webhooks/github";

    fn pr_event(action: &str, full_name: &str) -> InboundEvent {
        InboundEvent::PullRequest {
            action: action.into(),
            repository_full_name: full_name.into(),
            pr_number: 42,
        }
    }

    #[tokio::test]
    async fn opened_pull_request_is_submitted_for_its_owner() {
        let h = HarnessBuilder::new().build().await;

        let disposition = h.service.handle_event(pr_event("opened", "octo/repo")).await.unwrap();
        assert_eq!(
            disposition,
            EventDisposition::Submitted {
                job_id: "review:octo/repo#42".into()
            }
        );

        let request = ReviewRequest {
            owner: "octo".into(),
            repo: "repo".into(),
            pr_number: 42,
            user_id: "user-1".into(),
        };
        assert!(h.service.submit_review(request).wait().await.is_completed());
        assert_eq!(h.host.posts(), 1);

        let status = h.service.review_status("octo", "repo", 42).await.unwrap();
        assert_eq!(status.stage, Some(ReviewStage::Completed));
        assert_eq!(status.run, Some(1));
        assert!(status.record.is_some());
    }

    #[tokio::test]
    async fn other_actions_and_unknown_repositories_are_ignored() {
        let h = HarnessBuilder::new().build().await;

        let closed = h.service.handle_event(pr_event("closed", "octo/repo")).await.unwrap();
        assert!(matches!(closed, EventDisposition::Ignored { .. }));

        let unknown = h.service.handle_event(pr_event("opened", "ghost/repo")).await.unwrap();
        assert!(matches!(unknown, EventDisposition::Ignored { .. }));
        assert_eq!(h.service.engine().in_flight(), 0);

        let invalid = h.service.handle_event(pr_event("opened", "no-slash")).await;
        assert!(invalid.is_err());
    }

    #[tokio::test]
    async fn connect_registers_one_webhook_and_indexes() {
        let h = HarnessBuilder::new().webhook(CALLBACK).build().await;
        *h.host.files.lock().unwrap() = vec![
            RepoFile {
                path: "src/lib.rs".into(),
                content: "pub fn a() {}".into(),
            },
            RepoFile {
                path: "README.md".into(),
                content: "# repo".into(),
            },
        ];

        let first = h.service.connect_repository("octo", "repo", "user-1").await.unwrap();
        let hook = first.webhook.unwrap();
        assert!(hook.created);
        assert!(first.index_job_id.starts_with("index:octo/repo:"));

        let second = h.service.connect_repository("octo", "repo", "user-1").await.unwrap();
        assert!(!second.webhook.unwrap().created);
        assert_eq!(h.host.webhooks.lock().unwrap().len(), 1);

        let stats = h
            .service
            .submit_index(IndexRequest::new("octo", "repo", "user-1"))
            .wait()
            .await;
        let stats = match stats {
            JobOutcome::Completed(v) => v,
            other => panic!("expected indexing to complete, got {other:?}"),
        };
        assert_eq!(stats.failed, 0);
        assert_eq!(h.vectors.len().await, 2);

        assert_eq!(h.service.disconnect_repository("octo", "repo", "user-1").await.unwrap(), 1);
        assert!(h.host.webhooks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn connect_without_credential_fails() {
        let h = HarnessBuilder::new().webhook(CALLBACK).build().await;
        h.directory.remove_token("user-1").await;

        let err = h.service.connect_repository("octo", "repo", "user-1").await.unwrap_err();
        assert!(matches!(err, crate::errors::ReviewError::CredentialMissing { .. }));
        assert!(h.host.webhooks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn review_list_is_capped_and_scoped_to_the_repository() {
        use crate::records::{ReviewRecordStore, ReviewStatus};

        let h = HarnessBuilder::new().build().await;
        for pr_number in 1..=60 {
            h.records
                .upsert(&ReviewRecord {
                    repository_id: "repo-1".into(),
                    repository: "octo/repo".into(),
                    pr_number,
                    pr_title: format!("PR {pr_number}"),
                    pr_url: format!("https://github.com/octo/repo/pull/{pr_number}"),
                    review: "ok".into(),
                    status: ReviewStatus::Completed,
                    created_at: chrono::Utc::now(),
                })
                .await
                .unwrap();
        }

        assert_eq!(h.service.list_reviews("octo", "repo", 500).await.unwrap().len(), MAX_REVIEW_LIST);
        assert_eq!(h.service.list_reviews("Octo", "Repo", 3).await.unwrap().len(), 3);
        assert!(h.service.list_reviews("octo", "other", 10).await.unwrap().is_empty());
    }
}
