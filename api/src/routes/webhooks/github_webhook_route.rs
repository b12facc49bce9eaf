use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::Response,
};
use pr_reviewer::{EventDisposition, WebhookDelivery, parse_github_webhook, verify_signature};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::{
    app::{app_state::AppState, http::response_envelope::ApiResponse},
    error_handler::{AppError, AppResult},
};

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum WebhookResponse {
    Pong { message: &'static str },
    Disposition(EventDisposition),
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|h| h.to_str().ok())
}

/// GitHub webhook intake.
///
/// Verifies `X-Hub-Signature-256` when a secret is configured, then submits
/// the matching job and answers `202 Accepted` without waiting for it.
#[instrument(
    name = "github_webhook_route",
    skip_all,
    fields(delivery = header(&headers, "X-GitHub-Delivery").unwrap_or("-"))
)]
pub async fn github_webhook_route(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    if let Some(secret) = state.webhook_secret.as_deref() {
        if !verify_signature(secret, &body, header(&headers, "X-Hub-Signature-256")) {
            warn!("webhook signature rejected");
            return Err(AppError::Unauthorized(
                "invalid or missing X-Hub-Signature-256".into(),
            ));
        }
    }

    let delivery = parse_github_webhook(header(&headers, "X-GitHub-Event"), &body)?;
    let disposition = match delivery {
        WebhookDelivery::Ping => {
            debug!("webhook ping");
            return Ok(ApiResponse::ok(WebhookResponse::Pong { message: "pong" }));
        }
        WebhookDelivery::Ignored { event } => EventDisposition::Ignored {
            reason: format!("event `{event}` is not handled"),
        },
        WebhookDelivery::Event(event) => state.service.handle_event(event).await?,
    };

    info!(?disposition, "webhook handled");
    Ok(ApiResponse::accepted(WebhookResponse::Disposition(disposition)))
}
