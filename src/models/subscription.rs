//! Subscription model
//!
//! Readers follow publishers and journalists through two separate relations.
//! An edge either exists or it doesn't; there is no other state.

use serde::{Deserialize, Serialize};

use super::{Publisher, UserSummary};

/// A reader who should hear about a newly approved article
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub user_id: i64,
    pub username: String,
    pub email: String,
}

/// Everything a reader is subscribed to
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionSummary {
    pub publishers: Vec<Publisher>,
    pub journalists: Vec<UserSummary>,
}

/// Result of toggling a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionState {
    pub subscribed: bool,
}
