use crate::config::llm_provider::LlmProvider;

/// Configuration for one model endpoint (generation or embedding).
///
/// # Fields
///
/// - `provider`: backend to talk to.
/// - `model`: model identifier (e.g. `"qwen3:14b"`, `"text-embedding-3-small"`).
/// - `endpoint`: base URL of the provider, without the API path.
/// - `api_key`: bearer key for providers that require authentication.
/// - `max_tokens`, `temperature`, `top_p`: sampling knobs (generation only).
/// - `timeout_secs`: per-request timeout; every call is bounded by it.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmModelConfig {
    pub provider: LlmProvider,
    pub model: String,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub timeout_secs: Option<u64>,
}

impl LlmModelConfig {
    /// Effective request timeout, defaulting to 60 seconds.
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs.unwrap_or(60))
    }
}
