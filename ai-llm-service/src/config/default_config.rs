//! Default model configs loaded from environment variables.
//!
//! Two roles are supported:
//!
//! - **Generation** → the model that writes the review text
//! - **Embedding**  → the model that turns code and queries into vectors
//!
//! # Environment variables
//!
//! Common:
//! - `LLM_KIND` = provider kind (`ollama` | `openai`, default `ollama`)
//! - `LLM_MAX_TOKENS` = optional max tokens (u32)
//! - `LLM_TIMEOUT_SECS` = optional generation timeout (default 600)
//!
//! Ollama:
//! - `OLLAMA_URL` or `OLLAMA_PORT` = endpoint (mandatory)
//! - `OLLAMA_MODEL`                = generation model (mandatory)
//! - `EMBEDDING_MODEL`             = embedding model (mandatory)
//!
//! OpenAI:
//! - `OPENAI_API_KEY`              = bearer key (mandatory)
//! - `OPENAI_URL`                  = endpoint (default `https://api.openai.com`)
//! - `OPENAI_MODEL`                = generation model (mandatory)
//! - `OPENAI_EMBEDDING_MODEL`      = embedding model (default `text-embedding-3-small`)

use crate::{
    config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider},
    error_handler::{
        AiLlmError, ConfigError, env_opt_u32, env_opt_u64, must_env, validate_http_endpoint,
    },
};

/// Reads `LLM_KIND`, defaulting to Ollama when unset.
pub fn provider_from_env() -> Result<LlmProvider, AiLlmError> {
    match std::env::var("LLM_KIND") {
        Ok(v) if !v.trim().is_empty() => Ok(v.parse::<LlmProvider>()?),
        _ => Ok(LlmProvider::Ollama),
    }
}

/// Resolves the Ollama endpoint.
///
/// Precedence: `OLLAMA_URL`, then `OLLAMA_PORT` → `http://localhost:{port}`.
fn ollama_endpoint() -> Result<String, AiLlmError> {
    if let Ok(url) = std::env::var("OLLAMA_URL") {
        if !url.trim().is_empty() {
            validate_http_endpoint("OLLAMA_URL", &url)?;
            return Ok(url);
        }
    }
    if let Ok(port) = std::env::var("OLLAMA_PORT") {
        if !port.trim().is_empty() {
            port.parse::<u16>().map_err(|_| ConfigError::InvalidNumber {
                var: "OLLAMA_PORT",
                reason: "expected u16 (1..=65535)",
            })?;
            return Ok(format!("http://localhost:{port}"));
        }
    }
    Err(ConfigError::MissingVar("OLLAMA_URL or OLLAMA_PORT").into())
}

fn openai_endpoint() -> Result<String, AiLlmError> {
    let url = std::env::var("OPENAI_URL")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "https://api.openai.com".to_string());
    validate_http_endpoint("OPENAI_URL", &url)?;
    Ok(url)
}

/// Config for the review **generation** model.
///
/// # Defaults
/// - `temperature = Some(0.2)`
/// - `timeout_secs = Some(600)` unless `LLM_TIMEOUT_SECS` is set
pub fn config_generation() -> Result<LlmModelConfig, AiLlmError> {
    let max_tokens = env_opt_u32("LLM_MAX_TOKENS")?;
    let timeout_secs = env_opt_u64("LLM_TIMEOUT_SECS")?.or(Some(600));

    let (provider, endpoint, model, api_key) = match provider_from_env()? {
        LlmProvider::Ollama => (
            LlmProvider::Ollama,
            ollama_endpoint()?,
            must_env("OLLAMA_MODEL")?,
            None,
        ),
        LlmProvider::OpenAI => (
            LlmProvider::OpenAI,
            openai_endpoint()?,
            must_env("OPENAI_MODEL")?,
            Some(must_env("OPENAI_API_KEY")?),
        ),
    };

    Ok(LlmModelConfig {
        provider,
        model,
        endpoint,
        api_key,
        max_tokens,
        temperature: Some(0.2),
        top_p: None,
        timeout_secs,
    })
}

/// Config for the **embedding** model. Indexing and retrieval must share it.
///
/// # Defaults
/// - `temperature = Some(0.0)`
/// - `timeout_secs = Some(30)`
pub fn config_embedding() -> Result<LlmModelConfig, AiLlmError> {
    let (provider, endpoint, model, api_key) = match provider_from_env()? {
        LlmProvider::Ollama => (
            LlmProvider::Ollama,
            ollama_endpoint()?,
            must_env("EMBEDDING_MODEL")?,
            None,
        ),
        LlmProvider::OpenAI => (
            LlmProvider::OpenAI,
            openai_endpoint()?,
            std::env::var("OPENAI_EMBEDDING_MODEL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "text-embedding-3-small".to_string()),
            Some(must_env("OPENAI_API_KEY")?),
        ),
    };

    Ok(LlmModelConfig {
        provider,
        model,
        endpoint,
        api_key,
        max_tokens: None,
        temperature: Some(0.0),
        top_p: None,
        timeout_secs: Some(30),
    })
}
