//! Publisher service
//!
//! Publisher administration, journalist/editor membership and reader
//! subscriptions to publishers and journalists.

use crate::db::repositories::{
    PublisherRepository, SubscriptionRepository, SubscriptionTarget, UserRepository,
};
use crate::models::{
    CreatePublisherInput, Publisher, PublisherDetail, PublisherWithCounts, Role,
    SubscriptionState, SubscriptionSummary, User,
};
use crate::services::permissions::{self, Denied};
use anyhow::Context;
use std::sync::Arc;

const MAX_NAME_LEN: usize = 255;

#[derive(Debug, thiserror::Error)]
pub enum PublisherServiceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<Denied> for PublisherServiceError {
    fn from(denied: Denied) -> Self {
        Self::PermissionDenied(denied.0)
    }
}

pub struct PublisherService {
    publisher_repo: Arc<dyn PublisherRepository>,
    subscription_repo: Arc<dyn SubscriptionRepository>,
    user_repo: Arc<dyn UserRepository>,
}

impl PublisherService {
    pub fn new(
        publisher_repo: Arc<dyn PublisherRepository>,
        subscription_repo: Arc<dyn SubscriptionRepository>,
        user_repo: Arc<dyn UserRepository>,
    ) -> Self {
        Self {
            publisher_repo,
            subscription_repo,
            user_repo,
        }
    }

    /// Create a publisher. Staff only.
    pub async fn create(
        &self,
        actor: &User,
        input: CreatePublisherInput,
    ) -> Result<Publisher, PublisherServiceError> {
        permissions::can_create_publisher(actor)?;

        let name = input.name.trim();
        if name.is_empty() {
            return Err(PublisherServiceError::ValidationError(
                "Publisher name cannot be empty".to_string(),
            ));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(PublisherServiceError::ValidationError(format!(
                "Publisher name cannot exceed {} characters",
                MAX_NAME_LEN
            )));
        }
        if self
            .publisher_repo
            .get_by_name(name)
            .await
            .context("Failed to check publisher name")?
            .is_some()
        {
            return Err(PublisherServiceError::ValidationError(format!(
                "Publisher '{}' already exists",
                name
            )));
        }

        let publisher = self
            .publisher_repo
            .create(name)
            .await
            .context("Failed to create publisher")?;

        tracing::info!(publisher_id = publisher.id, actor = actor.id, "Publisher created");
        Ok(publisher)
    }

    pub async fn list(&self) -> Result<Vec<PublisherWithCounts>, PublisherServiceError> {
        Ok(self
            .publisher_repo
            .list()
            .await
            .context("Failed to list publishers")?)
    }

    /// Publisher with its journalist and editor members
    pub async fn detail(&self, id: i64) -> Result<PublisherDetail, PublisherServiceError> {
        let publisher = self.require_publisher(id).await?;
        let members = self
            .publisher_repo
            .list_members(id)
            .await
            .context("Failed to list publisher members")?;

        let (editors, journalists): (Vec<_>, Vec<_>) = members
            .into_iter()
            .partition(|m| m.role == Role::Editor);

        Ok(PublisherDetail {
            publisher,
            journalists,
            editors,
        })
    }

    /// Join a publisher.
    ///
    /// `as_role` defaults to the actor's own role. Joining twice is a no-op.
    pub async fn join(
        &self,
        publisher_id: i64,
        actor: &User,
        as_role: Option<Role>,
    ) -> Result<PublisherDetail, PublisherServiceError> {
        let as_role = as_role.unwrap_or(actor.role);
        permissions::can_join_publisher(actor, as_role)?;
        self.require_publisher(publisher_id).await?;

        let added = self
            .publisher_repo
            .add_member(publisher_id, actor.id, as_role)
            .await
            .context("Failed to add publisher member")?;
        if added {
            tracing::info!(publisher_id, user_id = actor.id, role = %as_role, "Joined publisher");
        }

        self.detail(publisher_id).await
    }

    /// Leave a publisher. The actor's articles keep their publisher.
    pub async fn leave(
        &self,
        publisher_id: i64,
        actor: &User,
    ) -> Result<PublisherDetail, PublisherServiceError> {
        self.require_publisher(publisher_id).await?;

        let removed = self
            .publisher_repo
            .remove_member(publisher_id, actor.id)
            .await
            .context("Failed to remove publisher member")?;
        if removed {
            tracing::info!(publisher_id, user_id = actor.id, "Left publisher");
        }

        self.detail(publisher_id).await
    }

    pub async fn toggle_publisher_subscription(
        &self,
        publisher_id: i64,
        reader: &User,
    ) -> Result<SubscriptionState, PublisherServiceError> {
        permissions::can_subscribe(reader)?;
        self.require_publisher(publisher_id).await?;
        self.toggle(reader, SubscriptionTarget::Publisher(publisher_id))
            .await
    }

    /// Toggle a subscription to a journalist. Non-journalist targets are not found.
    pub async fn toggle_journalist_subscription(
        &self,
        journalist_id: i64,
        reader: &User,
    ) -> Result<SubscriptionState, PublisherServiceError> {
        permissions::can_subscribe(reader)?;

        let journalist = self
            .user_repo
            .get_by_id(journalist_id)
            .await
            .context("Failed to get journalist")?;
        if !journalist.is_some_and(|u| u.is_journalist()) {
            return Err(PublisherServiceError::NotFound(format!(
                "Journalist {}",
                journalist_id
            )));
        }

        self.toggle(reader, SubscriptionTarget::Journalist(journalist_id))
            .await
    }

    /// Everything the reader is subscribed to
    pub async fn subscriptions(
        &self,
        reader: &User,
    ) -> Result<SubscriptionSummary, PublisherServiceError> {
        permissions::can_subscribe(reader)?;

        let publishers = self
            .subscription_repo
            .subscribed_publishers(reader.id)
            .await
            .context("Failed to list publisher subscriptions")?;
        let journalists = self
            .subscription_repo
            .subscribed_journalists(reader.id)
            .await
            .context("Failed to list journalist subscriptions")?;

        Ok(SubscriptionSummary {
            publishers,
            journalists,
        })
    }

    async fn toggle(
        &self,
        reader: &User,
        target: SubscriptionTarget,
    ) -> Result<SubscriptionState, PublisherServiceError> {
        let subscribed = self
            .subscription_repo
            .toggle(reader.id, target)
            .await
            .context("Failed to toggle subscription")?;

        tracing::debug!(reader = reader.id, ?target, subscribed, "Subscription toggled");
        Ok(SubscriptionState { subscribed })
    }

    async fn require_publisher(&self, id: i64) -> Result<Publisher, PublisherServiceError> {
        self.publisher_repo
            .get_by_id(id)
            .await
            .context("Failed to get publisher")?
            .ok_or_else(|| PublisherServiceError::NotFound(format!("Publisher {}", id)))
    }
}
