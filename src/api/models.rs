use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

use crate::llm::ModelOutcome;
use crate::scraper::Profile;
use crate::service::RoastResult;

#[derive(Deserialize)]
pub struct RoastRequest {
    pub url: String,
}

#[derive(Serialize)]
pub struct RoastResponse {
    pub url: String,
    pub user: Profile,
    pub models: Vec<ModelOutcome>,
    pub created_at: DateTime<Utc>,
    pub cached: bool,
    pub status: String,
}

impl From<RoastResult> for RoastResponse {
    fn from(result: RoastResult) -> Self {
        let entry = result.entry;
        let status = if result.cached { "success (cached)" } else { "success" };
        Self {
            url: entry.key.clone(),
            user: entry.profile.clone(),
            models: entry.outcomes.clone(),
            created_at: entry.created_at,
            cached: result.cached,
            status: status.to_string(),
        }
    }
}
