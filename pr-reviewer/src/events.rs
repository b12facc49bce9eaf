//! Inbound events, validated before any job is built from them.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::errors::{ReviewError, ReviewResult};

type HmacSha256 = Hmac<Sha256>;

/// Pull request actions that start a review.
const REVIEW_ACTIONS: [&str; 2] = ["opened", "reopened"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    PullRequest {
        action: String,
        repository_full_name: String,
        pr_number: u64,
    },
    RepositoryConnected {
        owner: String,
        repo: String,
        user_id: String,
    },
}

impl InboundEvent {
    pub fn validate(&self) -> ReviewResult<()> {
        match self {
            InboundEvent::PullRequest {
                action,
                repository_full_name,
                pr_number,
            } => {
                require("action", action)?;
                split_full_name(repository_full_name)?;
                if *pr_number == 0 {
                    return Err(ReviewError::Validation("pr_number must be positive".into()));
                }
                Ok(())
            }
            InboundEvent::RepositoryConnected {
                owner,
                repo,
                user_id,
            } => {
                require("owner", owner)?;
                require("repo", repo)?;
                require("user_id", user_id)
            }
        }
    }

    /// Whether this event asks for a review.
    pub fn requests_review(&self) -> bool {
        matches!(self, InboundEvent::PullRequest { action, .. } if REVIEW_ACTIONS.contains(&action.as_str()))
    }
}

fn require(field: &str, value: &str) -> ReviewResult<()> {
    if value.trim().is_empty() {
        return Err(ReviewError::Validation(format!("missing field `{field}`")));
    }
    Ok(())
}

/// Splits `owner/name`.
pub fn split_full_name(full_name: &str) -> ReviewResult<(&str, &str)> {
    match full_name.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok((owner, name))
        }
        _ => Err(ReviewError::Validation(format!(
            "invalid repository name `{full_name}`, expected owner/name"
        ))),
    }
}

/// Outcome of parsing one GitHub webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookDelivery {
    Ping,
    Event(InboundEvent),
    /// Event type this service does not handle.
    Ignored { event: String },
}

#[derive(Debug, Deserialize)]
struct RawPullRequestEvent {
    action: Option<String>,
    number: Option<u64>,
    pull_request: Option<RawPullRequest>,
    repository: Option<RawRepository>,
}

#[derive(Debug, Deserialize)]
struct RawPullRequest {
    number: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawRepository {
    full_name: Option<String>,
}

/// Parses a delivery from its `X-GitHub-Event` header and JSON body.
pub fn parse_github_webhook(event: Option<&str>, body: &[u8]) -> ReviewResult<WebhookDelivery> {
    let event = event
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| ReviewError::Validation("missing X-GitHub-Event header".into()))?;

    match event {
        "ping" => Ok(WebhookDelivery::Ping),
        "pull_request" => {
            let raw: RawPullRequestEvent = serde_json::from_slice(body)
                .map_err(|e| ReviewError::Validation(format!("invalid pull_request payload: {e}")))?;

            let action = raw
                .action
                .ok_or_else(|| ReviewError::Validation("missing field `action`".into()))?;
            let pr_number = raw
                .number
                .or_else(|| raw.pull_request.and_then(|p| p.number))
                .ok_or_else(|| ReviewError::Validation("missing field `number`".into()))?;
            let repository_full_name = raw
                .repository
                .and_then(|r| r.full_name)
                .ok_or_else(|| ReviewError::Validation("missing field `repository.full_name`".into()))?;

            let event = InboundEvent::PullRequest {
                action,
                repository_full_name,
                pr_number,
            };
            event.validate()?;
            Ok(WebhookDelivery::Event(event))
        }
        other => Ok(WebhookDelivery::Ignored {
            event: other.to_string(),
        }),
    }
}

/// Checks `X-Hub-Signature-256` (`sha256=<hex>`) against the shared secret.
pub fn verify_signature(secret: &str, body: &[u8], header: Option<&str>) -> bool {
    let Some(hex_sig) = header.and_then(|h| h.trim().strip_prefix("sha256=")) else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_sig) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}
