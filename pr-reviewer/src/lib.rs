//! Pull request review pipeline.
//!
//! A qualifying event becomes a [`ReviewJob`] run by the workflow engine:
//!
//! 1) `fetch-diff`: pull request title, description and unified diff
//! 2) `retrieve-context`: top-k related snippets from the vector index
//! 3) `generate-review`: one call to the generation model
//! 4) `post-comment`: publish the review on the pull request
//! 5) `persist-record`: upsert the [`ReviewRecord`] shown to users
//!
//! Every step is memoized in the checkpoint ledger, so a job interrupted at
//! any point resumes after its last successful step and never posts twice.
//! Connecting a repository registers the webhook and runs an
//! [`IndexRepositoryJob`] that fills the vector index.

pub mod accounts;
pub mod errors;
pub mod events;
pub mod generator;
pub mod indexing;
pub mod pipeline;
pub mod prompt;
pub mod records;
pub mod service;

#[cfg(test)]
mod test_support;

pub use accounts::{AccountDirectory, InMemoryDirectory, RepositoryEntry};
pub use errors::{ReviewError, ReviewResult};
pub use events::{InboundEvent, WebhookDelivery, parse_github_webhook, verify_signature};
pub use generator::{GenerationModel, LlmGenerationModel, ReviewGenerator};
pub use indexing::{IndexRepositoryJob, IndexRequest};
pub use pipeline::{PipelineDeps, ReviewJob, ReviewRequest, ReviewStage, ReviewSummary};
pub use records::{
    FileReviewStore, InMemoryReviewStore, ReviewRecord, ReviewRecordStore, ReviewStatus,
};
pub use service::{
    ConnectOutcome, EventDisposition, MAX_REVIEW_LIST, ReviewService, ReviewStatusView,
};
