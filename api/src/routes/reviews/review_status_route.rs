use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::Response,
};
use tracing::debug;

use crate::{
    app::{app_state::AppState, http::response_envelope::ApiResponse},
    error_handler::{AppError, AppResult},
};

/// Review state of one pull request: ledger stage plus the stored record.
pub async fn review_status_route(
    State(state): State<Arc<AppState>>,
    Path((owner, repo, pr)): Path<(String, String, u64)>,
) -> AppResult<Response> {
    let view = state.service.review_status(&owner, &repo, pr).await?;
    if view.stage.is_none() && view.record.is_none() {
        return Err(AppError::NotFound(format!(
            "no review for {owner}/{repo}#{pr}"
        )));
    }
    debug!(job_id = %view.job_id, stage = ?view.stage, "review status served");
    Ok(ApiResponse::ok(view))
}
