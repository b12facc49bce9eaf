use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::Response,
};
use pr_reviewer::MAX_REVIEW_LIST;
use serde::Deserialize;
use tracing::debug;

use crate::{
    app::{app_state::AppState, http::response_envelope::ApiResponse},
    error_handler::AppResult,
};

#[derive(Debug, Default, Deserialize)]
pub struct ReviewListQuery {
    pub limit: Option<usize>,
}

/// Review records of one repository, newest first.
pub async fn review_list_route(
    State(state): State<Arc<AppState>>,
    Path((owner, repo)): Path<(String, String)>,
    Query(query): Query<ReviewListQuery>,
) -> AppResult<Response> {
    let limit = query.limit.unwrap_or(MAX_REVIEW_LIST);
    let reviews = state.service.list_reviews(&owner, &repo, limit).await?;
    debug!(repository = %format!("{owner}/{repo}"), count = reviews.len(), "review list served");
    Ok(ApiResponse::ok(reviews))
}
