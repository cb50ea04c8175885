//! Data models
//!
//! Database entities, their input types and the pagination wrappers used by
//! the repositories and the API.

mod article;
mod newsletter;
mod pagination;
mod publisher;
mod subscription;
mod user;

pub use article::{
    Article, ArticleStatus, ArticleVisibility, CreateArticleInput, ReviewDecision, Transition,
    UpdateArticleInput,
};
pub use newsletter::{CreateNewsletterInput, Newsletter, UpdateNewsletterInput};
pub use pagination::{ListParams, PagedResult};
pub use publisher::{
    CreatePublisherInput, Membership, Publisher, PublisherDetail, PublisherWithCounts,
};
pub use subscription::{Recipient, SubscriptionState, SubscriptionSummary};
pub use user::{CreateUserInput, Permission, Role, User, UserSummary};
