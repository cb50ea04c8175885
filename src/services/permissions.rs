//! Authorization rules
//!
//! Each check combines the role's permission table ([`Role::permissions`]) with
//! the ownership and membership facts of the operation. Checks are pure; the
//! services look up whatever facts a check needs before calling it.

use crate::models::{Article, ArticleVisibility, Newsletter, Permission, Role, User};

/// A failed authorization check
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct Denied(pub String);

impl Denied {
    fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub type Check = Result<(), Denied>;

/// Require a permission from the user's role
pub fn require(user: &User, permission: Permission) -> Check {
    if user.has_permission(permission) {
        Ok(())
    } else {
        Err(Denied::new(format!(
            "Role '{}' lacks permission {:?}",
            user.role, permission
        )))
    }
}

pub fn can_create_publisher(user: &User) -> Check {
    if user.is_staff {
        Ok(())
    } else {
        Err(Denied::new("Only staff can create publishers"))
    }
}

/// Joining as `as_role` requires holding that role, and readers never join.
pub fn can_join_publisher(user: &User, as_role: Role) -> Check {
    require(user, Permission::JoinPublisher)?;
    if as_role == Role::Reader {
        return Err(Denied::new("Readers cannot join publishers"));
    }
    if user.role != as_role {
        return Err(Denied::new(format!(
            "A {} cannot join as {}",
            user.role, as_role
        )));
    }
    Ok(())
}

pub fn can_subscribe(user: &User) -> Check {
    require(user, Permission::Subscribe)
}

pub fn can_create_article(user: &User) -> Check {
    require(user, Permission::AddArticle)
}

/// Editors may change or delete any article; authors only their own while pending.
pub fn can_modify_article(user: &User, article: &Article, permission: Permission) -> Check {
    require(user, permission)?;
    if user.is_editor() {
        return Ok(());
    }
    if article.author_id != user.id {
        return Err(Denied::new("Only the author or an editor can modify this article"));
    }
    if !article.is_pending() {
        return Err(Denied::new("Articles can only be modified while pending"));
    }
    Ok(())
}

/// Approve/reject rights.
///
/// `is_publisher_editor` tells whether the user is an editor-member of the
/// article's publisher; it is ignored for unaffiliated articles.
pub fn can_review_article(user: &User, article: &Article, is_publisher_editor: bool) -> Check {
    require(user, Permission::ApproveArticle)?;
    if article.publisher_id.is_some() && !is_publisher_editor {
        return Err(Denied::new(
            "Only editors of the article's publisher can review it",
        ));
    }
    Ok(())
}

pub fn can_resubmit_article(user: &User, article: &Article) -> Check {
    if article.author_id != user.id {
        return Err(Denied::new("Only the author can resubmit this article"));
    }
    require(user, Permission::ChangeArticle)
}

/// Which articles the user can list
pub fn article_visibility(user: &User) -> ArticleVisibility {
    match user.role {
        Role::Reader => ArticleVisibility::Approved,
        Role::Journalist => ArticleVisibility::ApprovedOrAuthoredBy(user.id),
        Role::Editor => ArticleVisibility::ApprovedOrReviewableBy(user.id),
    }
}

/// Single-article counterpart of [`article_visibility`].
///
/// `editor_publisher_ids` are the publishers the user is an editor-member of.
pub fn can_view_article(user: &User, article: &Article, editor_publisher_ids: &[i64]) -> bool {
    if article.is_approved() {
        return true;
    }
    match article_visibility(user) {
        ArticleVisibility::Approved => false,
        ArticleVisibility::ApprovedOrAuthoredBy(id) => article.author_id == id,
        ArticleVisibility::ApprovedOrReviewableBy(_) => {
            article.is_pending()
                && article
                    .publisher_id
                    .map_or(true, |p| editor_publisher_ids.contains(&p))
        }
    }
}

pub fn can_create_newsletter(user: &User) -> Check {
    require(user, Permission::AddNewsletter)
}

/// Authors and editors may change or delete a newsletter
pub fn can_modify_newsletter(user: &User, newsletter: &Newsletter, permission: Permission) -> Check {
    require(user, permission)?;
    if user.is_editor() || newsletter.author_id == user.id {
        Ok(())
    } else {
        Err(Denied::new("Only the author or an editor can modify this newsletter"))
    }
}
