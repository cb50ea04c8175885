//! Services layer - Business logic
//!
//! Services enforce the authorization rules in [`permissions`], validate
//! input, and coordinate the repositories and the event bus.

pub mod article;
pub mod newsletter;
pub mod notification;
pub mod password;
pub mod permissions;
pub mod publisher;
pub mod rate_limiter;
pub mod social;
pub mod token;
pub mod user;

pub use article::{ArticleService, ArticleServiceError};
pub use newsletter::{NewsletterService, NewsletterServiceError};
pub use notification::{
    mailer_from_config, DeliveryError, DispatchReport, LogMailer, Mailer, NotificationDispatcher,
    OutgoingMail, SmtpMailer,
};
pub use password::{hash_password, verify_password};
pub use publisher::{PublisherService, PublisherServiceError};
pub use rate_limiter::LoginRateLimiter;
pub use social::TwitterAnnouncer;
pub use token::{Claims, JwtService, TokenError, TokenPair, TokenType};
pub use user::{UserService, UserServiceError};
