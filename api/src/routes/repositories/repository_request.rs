use pr_reviewer::{InboundEvent, ReviewResult};
use serde::{Deserialize, Serialize};

/// Body of `/repositories/connect` and `/repositories/disconnect`.
#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryRequest {
    pub owner: String,
    pub repo: String,
    pub user_id: String,
}

impl RepositoryRequest {
    /// Trims every field and rejects empty ones.
    pub fn normalized(self) -> ReviewResult<Self> {
        let req = Self {
            owner: self.owner.trim().to_string(),
            repo: self.repo.trim().to_string(),
            user_id: self.user_id.trim().to_string(),
        };
        InboundEvent::RepositoryConnected {
            owner: req.owner.clone(),
            repo: req.repo.clone(),
            user_id: req.user_id.clone(),
        }
        .validate()?;
        Ok(req)
    }
}

#[derive(Debug, Serialize)]
pub struct DisconnectResponse {
    pub repository: String,
    pub webhooks_removed: usize,
}
