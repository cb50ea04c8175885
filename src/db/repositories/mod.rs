//! Database repositories
//!
//! One repository per aggregate, each a trait with an SQLx implementation
//! covering SQLite and MySQL.

pub mod article;
pub mod newsletter;
pub mod publisher;
pub mod subscription;
pub mod user;

pub use article::{ArticleFields, ArticleRepository, SqlxArticleRepository};
pub use newsletter::{NewsletterFields, NewsletterRepository, SqlxNewsletterRepository};
pub use publisher::{PublisherRepository, SqlxPublisherRepository};
pub use subscription::{SqlxSubscriptionRepository, SubscriptionRepository, SubscriptionTarget};
pub use user::{SqlxUserRepository, UserRepository};
