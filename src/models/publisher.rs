//! Publisher model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Role, UserSummary};

/// A publishing organization journalists and editors can join
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Publisher {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Publisher with membership and subscriber counts, used in listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherWithCounts {
    #[serde(flatten)]
    pub publisher: Publisher,
    pub journalist_count: i64,
    pub editor_count: i64,
    pub subscriber_count: i64,
}

/// Publisher with its member lists
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherDetail {
    #[serde(flatten)]
    pub publisher: Publisher,
    pub journalists: Vec<UserSummary>,
    pub editors: Vec<UserSummary>,
}

/// A user's membership in a publisher.
///
/// `role` always matches the member's own role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub publisher_id: i64,
    pub user_id: i64,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePublisherInput {
    pub name: String,
}
