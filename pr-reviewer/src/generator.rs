//! Review generator: prompt assembly plus one call to the generation model.

use std::sync::Arc;

use ai_llm_service::LlmServiceProfiles;
use async_trait::async_trait;
use rag_base::ContextSnippet;
use tracing::{debug, instrument};

use crate::errors::{ReviewError, ReviewResult};
use crate::prompt::build_review_prompt;

/// Text completion backend.
#[async_trait]
pub trait GenerationModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> ReviewResult<String>;
}

/// [`GenerationModel`] backed by the configured generation profile.
pub struct LlmGenerationModel {
    llm: Arc<LlmServiceProfiles>,
}

impl LlmGenerationModel {
    pub fn new(llm: Arc<LlmServiceProfiles>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl GenerationModel for LlmGenerationModel {
    async fn complete(&self, prompt: &str) -> ReviewResult<String> {
        self.llm
            .generate(prompt, None)
            .await
            .map_err(|e| ReviewError::GenerationFailed(e.to_string()))
    }
}

pub struct ReviewGenerator {
    model: Arc<dyn GenerationModel>,
}

impl ReviewGenerator {
    pub fn new(model: Arc<dyn GenerationModel>) -> Self {
        Self { model }
    }

    /// Produces the review markdown. Section layout is requested from the
    /// model, not validated.
    #[instrument(skip_all, fields(title = %title, diff_bytes = diff.len(), snippets = context.len()))]
    pub async fn generate(
        &self,
        title: &str,
        description: Option<&str>,
        diff: &str,
        context: &[ContextSnippet],
    ) -> ReviewResult<String> {
        let prompt = build_review_prompt(title, description, diff, context);
        debug!(prompt_bytes = prompt.len(), "requesting review");

        let text = self.model.complete(&prompt).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ReviewError::GenerationFailed(
                "model returned an empty review".to_string(),
            ));
        }
        Ok(text.to_string())
    }
}
