use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
}

/// Process configuration for the HTTP service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Listen address, e.g. "0.0.0.0:8080".
    pub api_address: String,
    /// Root for the checkpoint ledger and review records.
    pub data_dir: PathBuf,
    /// Account/repository snapshot read at startup.
    pub directory_file: PathBuf,
    pub github_api_base: String,
    pub github_timeout: Duration,
    /// Public URL GitHub delivers webhooks to. Registration is skipped when unset.
    pub webhook_callback_url: Option<String>,
    /// HMAC secret for `X-Hub-Signature-256`. Deliveries are not verified when unset.
    pub webhook_secret: Option<String>,
    /// Per-attempt bound on the model call.
    pub generation_timeout: Option<Duration>,
}

impl AppConfig {
    /// Environment variables used:
    /// - `API_ADDRESS` (required)
    /// - `DATA_DIR` (default: "./data")
    /// - `DIRECTORY_FILE` (default: "$DATA_DIR/directory.json")
    /// - `GITHUB_API_BASE` (default: "https://api.github.com")
    /// - `GITHUB_TIMEOUT_SECS` (default: 30)
    /// - `WEBHOOK_CALLBACK_URL`, `WEBHOOK_SECRET` (optional)
    /// - `GENERATION_TIMEOUT_SECS` (optional)
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_address =
            read_string_env("API_ADDRESS").ok_or(ConfigError::MissingEnv("API_ADDRESS"))?;
        let data_dir =
            PathBuf::from(read_string_env("DATA_DIR").unwrap_or_else(|| "./data".into()));
        let directory_file = read_string_env("DIRECTORY_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("directory.json"));

        Ok(Self {
            api_address,
            directory_file,
            data_dir,
            github_api_base: read_string_env("GITHUB_API_BASE")
                .unwrap_or_else(|| "https://api.github.com".into()),
            github_timeout: Duration::from_secs(
                read_secs_env("GITHUB_TIMEOUT_SECS")?.unwrap_or(30),
            ),
            webhook_callback_url: read_string_env("WEBHOOK_CALLBACK_URL"),
            webhook_secret: read_string_env("WEBHOOK_SECRET"),
            generation_timeout: read_secs_env("GENERATION_TIMEOUT_SECS")?.map(Duration::from_secs),
        })
    }
}

fn read_string_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn read_secs_env(key: &'static str) -> Result<Option<u64>, ConfigError> {
    match read_string_env(key) {
        None => Ok(None),
        Some(v) => match v.parse::<u64>() {
            Ok(n) if n > 0 => Ok(Some(n)),
            _ => Err(ConfigError::Invalid { var: key, value: v }),
        },
    }
}
