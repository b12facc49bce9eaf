use std::sync::Arc;

use axum::{
    extract::{Json, State},
    response::Response,
};
use tracing::info;

use crate::{
    app::{app_state::AppState, http::response_envelope::ApiResponse},
    error_handler::AppResult,
    routes::repositories::repository_request::{DisconnectResponse, RepositoryRequest},
};

/// Registers the review webhook and starts indexing the repository.
pub async fn connect_repository_route(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RepositoryRequest>,
) -> AppResult<Response> {
    let req = body.normalized()?;
    let outcome = state
        .service
        .connect_repository(&req.owner, &req.repo, &req.user_id)
        .await?;
    info!(
        repository = %format!("{}/{}", req.owner, req.repo),
        index_job_id = %outcome.index_job_id,
        "repository connected"
    );
    Ok(ApiResponse::accepted(outcome))
}

pub async fn disconnect_repository_route(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RepositoryRequest>,
) -> AppResult<Response> {
    let req = body.normalized()?;
    let removed = state
        .service
        .disconnect_repository(&req.owner, &req.repo, &req.user_id)
        .await?;
    Ok(ApiResponse::ok(DisconnectResponse {
        repository: format!("{}/{}", req.owner, req.repo),
        webhooks_removed: removed,
    }))
}
