//! HTTP boundary: GitHub webhook intake, repository connect/disconnect and
//! review lookup on top of [`pr_reviewer::ReviewService`].

use std::sync::Arc;

use tokio::signal;
use tracing::{error, info, warn};

pub mod app;
pub mod error_handler;
mod middleware_layer;
pub mod routes;

use crate::app::{app_config::AppConfig, app_state::AppState};
use crate::error_handler::{AppError, AppResult};

pub async fn start() -> AppResult<()> {
    let config = AppConfig::from_env()?;
    let state = Arc::new(AppState::build(&config).await?);

    match state.service.resume_unfinished().await {
        Ok(n) if n > 0 => info!(resumed = n, "resumed unfinished jobs"),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "could not scan the ledger for unfinished jobs"),
    }

    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&config.api_address)
        .await
        .map_err(AppError::Bind)?;
    info!(address = %config.api_address, "listening");

    // Start server with graceful shutdown on Ctrl+C
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(AppError::Server)?;

    Ok(())
}

/// Resolves when Ctrl+C is pressed.
async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
