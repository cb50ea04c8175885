//! Article model
//!
//! Articles move through an editorial review: they are created `pending`,
//! an editor approves or rejects them, and a rejected article can be sent
//! back to `pending` by its author.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Article entity, joined with its author and publisher names
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub author_id: i64,
    pub author_username: String,
    /// Publisher the article was filed under, if any
    pub publisher_id: Option<i64>,
    pub publisher_name: Option<String>,
    pub status: ArticleStatus,
    /// Editor who last approved or rejected the article
    pub reviewed_by: Option<i64>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Article {
    pub fn is_pending(&self) -> bool {
        self.status == ArticleStatus::Pending
    }

    pub fn is_approved(&self) -> bool {
        self.status == ArticleStatus::Approved
    }

    /// First `max_chars` characters of the content, with an ellipsis when cut
    pub fn excerpt(&self, max_chars: usize) -> String {
        let mut chars = self.content.chars();
        let head: String = chars.by_ref().take(max_chars).collect();
        if chars.next().is_some() {
            format!("{}...", head)
        } else {
            head
        }
    }
}

/// Article review status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleStatus {
    /// Awaiting editorial review
    Pending,
    /// Visible to everyone
    Approved,
    /// Returned to the author
    Rejected,
}

impl Default for ArticleStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl ArticleStatus {
    pub const ALL: [ArticleStatus; 3] = [
        ArticleStatus::Pending,
        ArticleStatus::Approved,
        ArticleStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleStatus::Pending => "pending",
            ArticleStatus::Approved => "approved",
            ArticleStatus::Rejected => "rejected",
        }
    }

    /// Outcome of applying an editorial decision to an article in this status.
    pub fn review(self, decision: ReviewDecision) -> Transition {
        match (self, decision) {
            (ArticleStatus::Pending, _) => Transition::Apply(decision.target()),
            (current, decision) if current == decision.target() => Transition::Unchanged,
            _ => Transition::Invalid,
        }
    }
}

impl fmt::Display for ArticleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArticleStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ArticleStatus::Pending),
            "approved" => Ok(ArticleStatus::Approved),
            "rejected" => Ok(ArticleStatus::Rejected),
            _ => Err(anyhow::anyhow!("Invalid article status: {}", s)),
        }
    }
}

/// Editorial decision on a pending article
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    Reject,
}

impl ReviewDecision {
    pub fn target(&self) -> ArticleStatus {
        match self {
            ReviewDecision::Approve => ArticleStatus::Approved,
            ReviewDecision::Reject => ArticleStatus::Rejected,
        }
    }
}

/// Result of [`ArticleStatus::review`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Move to the given status
    Apply(ArticleStatus),
    /// Already in the requested status; nothing to do
    Unchanged,
    /// Not reachable from the current status
    Invalid,
}

/// Which articles a caller may list or read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleVisibility {
    /// Approved articles only
    Approved,
    /// Approved articles plus everything written by the journalist
    ApprovedOrAuthoredBy(i64),
    /// Approved articles plus pending articles the editor may review
    ApprovedOrReviewableBy(i64),
}

/// Input for creating an article
#[derive(Debug, Clone, Deserialize)]
pub struct CreateArticleInput {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub publisher_id: Option<i64>,
}

/// Input for updating an article. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateArticleInput {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub publisher_id: Option<i64>,
}

impl UpdateArticleInput {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.publisher_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample(content: &str) -> Article {
        let now = Utc::now();
        Article {
            id: 1,
            title: "Title".into(),
            content: content.into(),
            author_id: 1,
            author_username: "jane".into(),
            publisher_id: None,
            publisher_name: None,
            status: ArticleStatus::Pending,
            reviewed_by: None,
            reviewed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_pending_accepts_both_decisions() {
        assert_eq!(
            ArticleStatus::Pending.review(ReviewDecision::Approve),
            Transition::Apply(ArticleStatus::Approved)
        );
        assert_eq!(
            ArticleStatus::Pending.review(ReviewDecision::Reject),
            Transition::Apply(ArticleStatus::Rejected)
        );
    }

    #[test]
    fn test_repeated_decision_is_unchanged() {
        assert_eq!(
            ArticleStatus::Approved.review(ReviewDecision::Approve),
            Transition::Unchanged
        );
        assert_eq!(
            ArticleStatus::Rejected.review(ReviewDecision::Reject),
            Transition::Unchanged
        );
    }

    #[test]
    fn test_reversing_a_decision_is_invalid() {
        assert_eq!(
            ArticleStatus::Approved.review(ReviewDecision::Reject),
            Transition::Invalid
        );
        assert_eq!(
            ArticleStatus::Rejected.review(ReviewDecision::Approve),
            Transition::Invalid
        );
    }

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        let article = sample("héllo wörld");
        assert_eq!(article.excerpt(5), "héllo...");
        assert_eq!(article.excerpt(50), "héllo wörld");
    }

    #[test]
    fn test_status_parse() {
        for status in ArticleStatus::ALL {
            assert_eq!(status.as_str().parse::<ArticleStatus>().unwrap(), status);
        }
        assert!("draft".parse::<ArticleStatus>().is_err());
    }

    fn any_status() -> impl Strategy<Value = ArticleStatus> {
        prop::sample::select(ArticleStatus::ALL.to_vec())
    }

    fn any_decision() -> impl Strategy<Value = ReviewDecision> {
        prop::sample::select(vec![ReviewDecision::Approve, ReviewDecision::Reject])
    }

    proptest! {
        #[test]
        fn review_never_leaves_a_decided_article_in_another_decided_state(
            status in any_status(),
            decision in any_decision(),
        ) {
            match status.review(decision) {
                Transition::Apply(next) => {
                    prop_assert_eq!(status, ArticleStatus::Pending);
                    prop_assert_eq!(next, decision.target());
                }
                Transition::Unchanged => prop_assert_eq!(status, decision.target()),
                Transition::Invalid => {
                    prop_assert_ne!(status, ArticleStatus::Pending);
                    prop_assert_ne!(status, decision.target());
                }
            }
        }
    }
}
