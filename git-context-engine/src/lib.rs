pub mod errors;
pub mod git_providers;

pub use errors::{GitContextEngineError, GitContextEngineResult};
pub use git_providers::{
    GitHubClient, PostedComment, PullRequestDiff, RepoFile, RepoRef, SourceHost, TreeWalker,
    Webhook, WebhookConfig,
};
