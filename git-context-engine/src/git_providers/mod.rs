//! Source host facade.
//!
//! [`SourceHost`] is the seam the review pipeline depends on; [`GitHubClient`]
//! is the production implementation. Tests substitute in-memory fakes.

pub mod types;
pub use types::*;

pub mod github;
pub mod tree;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::errors::GitContextEngineResult;
pub use github::GitHubClient;
pub use tree::TreeWalker;

/// Operations the pipeline needs from a source host.
#[async_trait]
pub trait SourceHost: Send + Sync {
    async fn fetch_diff(
        &self,
        repo: &RepoRef,
        pr_number: u64,
        token: &str,
    ) -> GitContextEngineResult<PullRequestDiff>;

    /// Streams every text file of the default branch.
    async fn walk_tree(
        &self,
        repo: &RepoRef,
        token: &str,
    ) -> GitContextEngineResult<BoxStream<'static, RepoFile>>;

    async fn post_comment(
        &self,
        repo: &RepoRef,
        pr_number: u64,
        body: &str,
        token: &str,
    ) -> GitContextEngineResult<PostedComment>;

    async fn ensure_webhook(
        &self,
        repo: &RepoRef,
        cfg: &WebhookConfig,
        token: &str,
    ) -> GitContextEngineResult<Webhook>;

    async fn remove_webhook(
        &self,
        repo: &RepoRef,
        callback_url: &str,
        token: &str,
    ) -> GitContextEngineResult<usize>;
}

#[async_trait]
impl SourceHost for GitHubClient {
    async fn fetch_diff(
        &self,
        repo: &RepoRef,
        pr_number: u64,
        token: &str,
    ) -> GitContextEngineResult<PullRequestDiff> {
        GitHubClient::fetch_diff(self, repo, pr_number, token).await
    }

    async fn walk_tree(
        &self,
        repo: &RepoRef,
        token: &str,
    ) -> GitContextEngineResult<BoxStream<'static, RepoFile>> {
        let walker = TreeWalker::start(self.clone(), repo.clone(), token.to_string()).await?;
        Ok(walker.into_stream())
    }

    async fn post_comment(
        &self,
        repo: &RepoRef,
        pr_number: u64,
        body: &str,
        token: &str,
    ) -> GitContextEngineResult<PostedComment> {
        GitHubClient::post_comment(self, repo, pr_number, body, token).await
    }

    async fn ensure_webhook(
        &self,
        repo: &RepoRef,
        cfg: &WebhookConfig,
        token: &str,
    ) -> GitContextEngineResult<Webhook> {
        GitHubClient::ensure_webhook(self, repo, cfg, token).await
    }

    async fn remove_webhook(
        &self,
        repo: &RepoRef,
        callback_url: &str,
        token: &str,
    ) -> GitContextEngineResult<usize> {
        GitHubClient::remove_webhook(self, repo, callback_url, token).await
    }
}
