//! Newsletter model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A journalist-curated collection of articles. Newsletters are not reviewed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Newsletter {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub author_id: i64,
    pub author_username: String,
    /// Referenced article ids, ascending
    pub article_ids: Vec<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateNewsletterInput {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub article_ids: Vec<i64>,
}

/// Input for updating a newsletter. `article_ids`, when present, replaces the set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateNewsletterInput {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub article_ids: Option<Vec<i64>>,
}
