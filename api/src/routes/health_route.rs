use std::sync::Arc;

use axum::{extract::State, response::Response};
use serde::Serialize;

use crate::app::{app_state::AppState, http::response_envelope::ApiResponse};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Jobs currently executing in this process.
    pub in_flight: usize,
}

pub async fn health_route(State(state): State<Arc<AppState>>) -> Response {
    ApiResponse::ok(HealthResponse {
        status: "ok",
        in_flight: state.service.engine().in_flight(),
    })
}
