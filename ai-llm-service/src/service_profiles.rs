//! Shared LLM service with two profiles: `generation` and `embedding`.
//!
//! Construct once at startup, wrap in `Arc`, and pass clones to dependents.
//! Both profiles must be configured; there is no fallback between them.

use tracing::info;

use crate::{
    config::{
        default_config::{config_embedding, config_generation},
        llm_model_config::LlmModelConfig,
        llm_provider::LlmProvider,
    },
    error_handler::AiLlmError,
    services::{ollama_service::OllamaService, open_ai_service::OpenAiService},
};

/// Provider-specific client behind one profile.
#[derive(Debug)]
enum LlmClient {
    Ollama(OllamaService),
    OpenAI(OpenAiService),
}

impl LlmClient {
    fn build(cfg: &LlmModelConfig) -> Result<Self, AiLlmError> {
        Ok(match cfg.provider {
            LlmProvider::Ollama => LlmClient::Ollama(OllamaService::new(cfg.clone())?),
            LlmProvider::OpenAI => LlmClient::OpenAI(OpenAiService::new(cfg.clone())?),
        })
    }
}

/// Generation and embedding clients, built eagerly.
#[derive(Debug)]
pub struct LlmServiceProfiles {
    generation: LlmClient,
    embedding: LlmClient,
}

impl LlmServiceProfiles {
    pub fn new(generation: LlmModelConfig, embedding: LlmModelConfig) -> Result<Self, AiLlmError> {
        let generation_client = LlmClient::build(&generation)?;
        let embedding_client = LlmClient::build(&embedding)?;

        info!(
            generation_provider = ?generation.provider,
            generation_model = %generation.model,
            embedding_provider = ?embedding.provider,
            embedding_model = %embedding.model,
            "llm profiles initialized"
        );

        Ok(Self {
            generation: generation_client,
            embedding: embedding_client,
        })
    }

    /// Builds both profiles from environment variables.
    pub fn from_env() -> Result<Self, AiLlmError> {
        Self::new(config_generation()?, config_embedding()?)
    }

    /// Generates text with the generation profile.
    ///
    /// Ollama has no system role on `/api/generate`, so the system text is
    /// prepended to the prompt there.
    pub async fn generate(&self, prompt: &str, system: Option<&str>) -> Result<String, AiLlmError> {
        match &self.generation {
            LlmClient::Ollama(svc) => match system {
                Some(sys) => svc.generate(&format!("{sys}\n\n{prompt}")).await,
                None => svc.generate(prompt).await,
            },
            LlmClient::OpenAI(svc) => svc.generate(prompt, system).await,
        }
    }

    /// Computes one embedding with the embedding profile.
    pub async fn embed(&self, input: &str) -> Result<Vec<f32>, AiLlmError> {
        match &self.embedding {
            LlmClient::Ollama(svc) => svc.embeddings(input).await,
            LlmClient::OpenAI(svc) => svc.embeddings(input).await,
        }
    }
}
