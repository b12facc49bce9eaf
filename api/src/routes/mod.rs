use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::app::app_state::AppState;
use crate::middleware_layer::json_extractor::json_error_mapper;

pub mod health_route;
pub mod repositories;
pub mod reviews;
pub mod webhooks;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_route::health_route))
        .route(
            "/webhooks/github",
            post(webhooks::github_webhook_route::github_webhook_route),
        )
        .route(
            "/repositories/connect",
            post(repositories::repository_routes::connect_repository_route),
        )
        .route(
            "/repositories/disconnect",
            post(repositories::repository_routes::disconnect_repository_route),
        )
        .route(
            "/reviews/{owner}/{repo}",
            get(reviews::review_list_route::review_list_route),
        )
        .route(
            "/reviews/{owner}/{repo}/{pr}",
            get(reviews::review_status_route::review_status_route),
        )
        .layer(middleware::from_fn(json_error_mapper))
        .with_state(state)
}
