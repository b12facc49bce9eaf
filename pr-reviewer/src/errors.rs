//! Crate-wide error hierarchy for pr-reviewer.
//!
//! Every external failure is classified here so the step runner can tell
//! retryable outages from errors that must abort the job.

use git_context_engine::GitContextEngineError;
use rag_base::RagBaseError;
use thiserror::Error;
use workflow_engine::{Retryable, WorkflowError};

/// Convenient alias for crate-wide results.
pub type ReviewResult<T> = Result<T, ReviewError>;

#[derive(Debug, Error)]
pub enum ReviewError {
    /// Network failure, 5xx or rate limit from the source host.
    #[error("source host unavailable: {0}")]
    TransientHost(String),

    /// Pull request, repository or file does not exist on the host.
    #[error("not found: {0}")]
    NotFound(String),

    /// Host refused the request for a reason retrying will not fix.
    #[error("source host rejected the request: {0}")]
    HostRejected(String),

    /// The owning user has no linked access token.
    #[error("No GitHub account linked for user {user_id}. Please reconnect your GitHub account.")]
    CredentialMissing { user_id: String },

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("vector store error: {0}")]
    VectorStore(String),

    /// Model call failed, timed out or answered with nothing.
    #[error("review generation failed: {0}")]
    GenerationFailed(String),

    /// Review record or registry could not be read or written.
    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

impl Retryable for ReviewError {
    fn is_retryable(&self) -> bool {
        match self {
            ReviewError::TransientHost(_)
            | ReviewError::VectorStore(_)
            | ReviewError::GenerationFailed(_) => true,
            ReviewError::Workflow(e) => e.is_retryable(),
            ReviewError::NotFound(_)
            | ReviewError::HostRejected(_)
            | ReviewError::CredentialMissing { .. }
            | ReviewError::Embedding(_)
            | ReviewError::Persistence(_)
            | ReviewError::Validation(_) => false,
        }
    }
}

// ===== Conversions for `?` ergonomics =====

impl From<GitContextEngineError> for ReviewError {
    fn from(e: GitContextEngineError) -> Self {
        if e.is_not_found() {
            return ReviewError::NotFound(e.to_string());
        }
        if e.is_transient() {
            return ReviewError::TransientHost(e.to_string());
        }
        match e {
            GitContextEngineError::Validation(msg) => ReviewError::Validation(msg),
            other => ReviewError::HostRejected(other.to_string()),
        }
    }
}

impl From<RagBaseError> for ReviewError {
    fn from(e: RagBaseError) -> Self {
        match e {
            RagBaseError::Qdrant(msg) => ReviewError::VectorStore(msg),
            RagBaseError::Embedding(msg) => ReviewError::Embedding(msg),
            e @ RagBaseError::DimensionMismatch { .. } => ReviewError::Embedding(e.to_string()),
            other => ReviewError::Validation(other.to_string()),
        }
    }
}

impl From<std::io::Error> for ReviewError {
    fn from(e: std::io::Error) -> Self {
        ReviewError::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for ReviewError {
    fn from(e: serde_json::Error) -> Self {
        ReviewError::Persistence(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git_context_engine::errors::GitContextEngineProviderError;

    #[test]
    fn host_errors_are_classified() {
        let e: ReviewError = GitContextEngineError::from(GitContextEngineProviderError::Server(502)).into();
        assert!(matches!(e, ReviewError::TransientHost(_)));
        assert!(e.is_retryable());

        let e: ReviewError = GitContextEngineError::from(GitContextEngineProviderError::NotFound).into();
        assert!(matches!(e, ReviewError::NotFound(_)));
        assert!(!e.is_retryable());

        let e: ReviewError = GitContextEngineError::from(GitContextEngineProviderError::Unauthorized).into();
        assert!(matches!(e, ReviewError::HostRejected(_)));
        assert!(!e.is_retryable());
    }

    #[test]
    fn step_timeouts_are_retryable_but_abandonment_is_not() {
        let timeout = ReviewError::from(WorkflowError::StepTimeout {
            step: "generate-review".into(),
            after: std::time::Duration::from_secs(1),
        });
        assert!(timeout.is_retryable());

        let abandoned = ReviewError::from(WorkflowError::Abandoned { job_id: "x".into() });
        assert!(!abandoned.is_retryable());
    }

    #[test]
    fn credential_message_names_the_user() {
        let e = ReviewError::CredentialMissing { user_id: "u1".into() };
        assert_eq!(
            e.to_string(),
            "No GitHub account linked for user u1. Please reconnect your GitHub account."
        );
    }
}
