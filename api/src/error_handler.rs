use ai_llm_service::AiLlmError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use git_context_engine::GitContextEngineError;
use pr_reviewer::ReviewError;
use rag_base::RagBaseError;
use thiserror::Error;
use tracing::error;
use workflow_engine::WorkflowError;

use crate::app::app_config::ConfigError;
use crate::app::http::response_envelope::ApiResponse;

/// Public application error type.
#[derive(Debug, Error)]
pub enum AppError {
    // --- Boot / config ---
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A collaborator could not be built at startup.
    #[error("failed to initialize {component}: {message}")]
    Startup {
        component: &'static str,
        message: String,
    },

    // --- IO / network / server ---
    #[error("failed to bind listener")]
    Bind(#[source] std::io::Error),

    #[error("server error")]
    Server(#[source] std::io::Error),

    // --- Request / routing ---
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Review(#[from] ReviewError),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Config(_) | AppError::Startup { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Bind(_) | AppError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Review(e) => match e {
                ReviewError::Validation(_) => StatusCode::BAD_REQUEST,
                ReviewError::CredentialMissing { .. } => StatusCode::UNAUTHORIZED,
                ReviewError::NotFound(_) => StatusCode::NOT_FOUND,
                ReviewError::HostRejected(_) => StatusCode::FORBIDDEN,
                ReviewError::TransientHost(_)
                | ReviewError::Embedding(_)
                | ReviewError::VectorStore(_)
                | ReviewError::GenerationFailed(_) => StatusCode::BAD_GATEWAY,
                ReviewError::Persistence(_) | ReviewError::Workflow(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Startup { .. } => "STARTUP_ERROR",
            AppError::Bind(_) => "BIND_ERROR",
            AppError::Server(_) => "SERVER_ERROR",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Review(e) => match e {
                ReviewError::Validation(_) => "VALIDATION_ERROR",
                ReviewError::CredentialMissing { .. } => "CREDENTIAL_MISSING",
                ReviewError::NotFound(_) => "NOT_FOUND",
                ReviewError::HostRejected(_) => "HOST_REJECTED",
                ReviewError::TransientHost(_) => "HOST_UNAVAILABLE",
                ReviewError::Embedding(_) => "EMBEDDING_ERROR",
                ReviewError::VectorStore(_) => "VECTOR_STORE_ERROR",
                ReviewError::GenerationFailed(_) => "GENERATION_FAILED",
                ReviewError::Persistence(_) => "PERSISTENCE_ERROR",
                ReviewError::Workflow(_) => "WORKFLOW_ERROR",
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, code = self.error_code(), "request failed");
        }
        ApiResponse::<()>::error(self.error_code(), self.to_string(), Vec::new())
            .into_response_with_status(status)
    }
}

/// Handy result alias used across handlers.
pub type AppResult<T> = Result<T, AppError>;

impl From<axum::extract::rejection::JsonRejection> for AppError {
    fn from(err: axum::extract::rejection::JsonRejection) -> Self {
        AppError::BadRequest(err.body_text())
    }
}

impl From<AiLlmError> for AppError {
    fn from(err: AiLlmError) -> Self {
        AppError::Startup {
            component: "llm profiles",
            message: err.to_string(),
        }
    }
}

impl From<RagBaseError> for AppError {
    fn from(err: RagBaseError) -> Self {
        AppError::Startup {
            component: "vector store",
            message: err.to_string(),
        }
    }
}

impl From<GitContextEngineError> for AppError {
    fn from(err: GitContextEngineError) -> Self {
        AppError::Startup {
            component: "github client",
            message: err.to_string(),
        }
    }
}

impl From<WorkflowError> for AppError {
    fn from(err: WorkflowError) -> Self {
        AppError::Startup {
            component: "checkpoint ledger",
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn review_errors_map_to_http_statuses() {
        let cases = [
            (ReviewError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (
                ReviewError::CredentialMissing {
                    user_id: "u".into(),
                },
                StatusCode::UNAUTHORIZED,
            ),
            (ReviewError::NotFound("pr".into()), StatusCode::NOT_FOUND),
            (ReviewError::TransientHost("503".into()), StatusCode::BAD_GATEWAY),
            (
                ReviewError::Persistence("disk".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status_code(), status);
        }
    }

    #[test]
    fn credential_message_is_user_facing() {
        let err = AppError::from(ReviewError::CredentialMissing {
            user_id: "u1".into(),
        });
        assert_eq!(err.error_code(), "CREDENTIAL_MISSING");
        assert!(err.to_string().contains("Please reconnect your GitHub account"));
    }
}
