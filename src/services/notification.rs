//! Approval notifications
//!
//! When an article is approved every reader subscribed to its publisher or to
//! its author gets one email. Deliveries run concurrently; a failed delivery
//! is logged and counted but never stops the others.

use crate::config::MailConfig;
use crate::db::repositories::SubscriptionRepository;
use crate::events::{ContentEvent, EventHandler};
use crate::models::{Article, Recipient};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;
use tracing::{info, warn};

const EXCERPT_CHARS: usize = 200;

/// A rendered email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Mail transport
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<()>;
}

/// SMTP transport over lettre
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Result<Self> {
        if config.smtp_host.is_empty() {
            return Err(anyhow!("SMTP host not configured"));
        }

        let from = format!("{} <{}>", config.from_name, config.from_address)
            .parse()
            .map_err(|e| anyhow!("Invalid from address: {}", e))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            .map_err(|e| anyhow!("Failed to create SMTP transport: {}", e))?
            .port(config.smtp_port);
        if !config.smtp_username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(mail
                .to
                .parse()
                .map_err(|e| anyhow!("Invalid to address: {}", e))?)
            .subject(mail.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(mail.body.clone())
            .map_err(|e| anyhow!("Failed to build email: {}", e))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| anyhow!("Failed to send email: {}", e))?;
        Ok(())
    }
}

/// Writes mail to the log instead of sending it. Used when mail is disabled.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<()> {
        info!(to = %mail.to, subject = %mail.subject, "Mail delivery disabled, not sending");
        Ok(())
    }
}

/// Pick the transport for the mail config
pub fn mailer_from_config(config: &MailConfig) -> Result<Arc<dyn Mailer>> {
    if config.enabled {
        Ok(Arc::new(SmtpMailer::new(config)?))
    } else {
        Ok(Arc::new(LogMailer))
    }
}

/// One failed delivery
#[derive(Debug, thiserror::Error)]
#[error("Delivery to {recipient} failed: {reason:#}")]
pub struct DeliveryError {
    pub recipient: String,
    pub reason: anyhow::Error,
}

/// Outcome of notifying the subscribers of one article
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Recipients without an email address
    pub skipped: usize,
}

/// Render the approval email for one recipient
pub fn compose_approval_mail(article: &Article, recipient: &Recipient, site_url: &str) -> OutgoingMail {
    let link = format!("{}/articles/{}/", site_url.trim_end_matches('/'), article.id);
    let body = format!(
        "Hello {},\n\n\
         A new article has been published that you might be interested in:\n\n\
         Title: {}\n\
         Author: {}\n\n\
         {}\n\n\
         Read the full article: {}\n",
        recipient.username,
        article.title,
        article.author_username,
        article.excerpt(EXCERPT_CHARS),
        link
    );

    OutgoingMail {
        to: recipient.email.clone(),
        subject: format!("New Article: {}", article.title),
        body,
    }
}

pub struct NotificationDispatcher {
    subscription_repo: Arc<dyn SubscriptionRepository>,
    mailer: Arc<dyn Mailer>,
    site_url: String,
}

impl NotificationDispatcher {
    pub fn new(
        subscription_repo: Arc<dyn SubscriptionRepository>,
        mailer: Arc<dyn Mailer>,
        site_url: String,
    ) -> Self {
        Self {
            subscription_repo,
            mailer,
            site_url,
        }
    }

    /// Email every distinct subscriber of the article's author and publisher
    pub async fn dispatch(&self, article: &Article) -> Result<DispatchReport> {
        let recipients = self
            .subscription_repo
            .recipients_for(article.author_id, article.publisher_id)
            .await
            .context("Failed to resolve notification recipients")?;

        let (deliverable, skipped): (Vec<_>, Vec<_>) = recipients
            .into_iter()
            .partition(|r| !r.email.trim().is_empty());

        let sends = deliverable.iter().map(|recipient| async move {
            let mail = compose_approval_mail(article, recipient, &self.site_url);
            self.mailer
                .send(&mail)
                .await
                .map_err(|reason| DeliveryError {
                    recipient: recipient.username.clone(),
                    reason,
                })
        });
        let results = join_all(sends).await;

        let mut report = DispatchReport {
            attempted: results.len(),
            skipped: skipped.len(),
            ..Default::default()
        };
        for result in results {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(article_id = article.id, "{}", e);
                }
            }
        }

        info!(
            article_id = article.id,
            attempted = report.attempted,
            delivered = report.delivered,
            failed = report.failed,
            skipped = report.skipped,
            "Approval notifications dispatched"
        );
        Ok(report)
    }
}

#[async_trait]
impl EventHandler for NotificationDispatcher {
    fn name(&self) -> &str {
        "notification_dispatcher"
    }

    async fn handle(&self, event: &ContentEvent) -> Result<()> {
        match event {
            ContentEvent::ArticleApproved { article, .. } => {
                self.dispatch(article).await?;
            }
        }
        Ok(())
    }
}

/// Test mailer that records what it was asked to send
#[cfg(test)]
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: std::sync::Mutex<Vec<OutgoingMail>>,
    /// Addresses that fail to deliver
    pub failing: Vec<String>,
}

#[cfg(test)]
#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<()> {
        if self.failing.contains(&mail.to) {
            anyhow::bail!("mailbox unavailable");
        }
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        ArticleFields, ArticleRepository, PublisherRepository, SqlxArticleRepository,
        SqlxPublisherRepository, SqlxSubscriptionRepository, SqlxUserRepository,
        SubscriptionTarget, UserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::{Role, User};

    struct Fixture {
        users: Arc<dyn UserRepository>,
        publishers: Arc<dyn PublisherRepository>,
        articles: Arc<dyn ArticleRepository>,
        subscriptions: Arc<dyn SubscriptionRepository>,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        Fixture {
            users: SqlxUserRepository::boxed(pool.clone()),
            publishers: SqlxPublisherRepository::boxed(pool.clone()),
            articles: SqlxArticleRepository::boxed(pool.clone()),
            subscriptions: SqlxSubscriptionRepository::boxed(pool),
        }
    }

    async fn user(f: &Fixture, name: &str, role: Role) -> User {
        f.users
            .create(&User::new(name.into(), format!("{}@example.com", name), "h".into(), role))
            .await
            .unwrap()
    }

    fn dispatcher(f: &Fixture, mailer: Arc<RecordingMailer>) -> NotificationDispatcher {
        NotificationDispatcher::new(f.subscriptions.clone(), mailer, "https://news.example/".into())
    }

    #[tokio::test]
    async fn test_one_mail_per_distinct_subscriber() {
        let f = setup().await;
        let journalist = user(&f, "jane", Role::Journalist).await;
        let both = user(&f, "bob", Role::Reader).await;
        let publisher_only = user(&f, "pat", Role::Reader).await;
        let author_only = user(&f, "amy", Role::Reader).await;
        let _unsubscribed = user(&f, "uma", Role::Reader).await;
        let publisher = f.publishers.create("Daily").await.unwrap();

        for reader in [&both, &publisher_only] {
            f.subscriptions
                .toggle(reader.id, SubscriptionTarget::Publisher(publisher.id))
                .await
                .unwrap();
        }
        for reader in [&both, &author_only] {
            f.subscriptions
                .toggle(reader.id, SubscriptionTarget::Journalist(journalist.id))
                .await
                .unwrap();
        }

        let fields = ArticleFields {
            title: "Breaking".into(),
            content: "x".repeat(500),
            publisher_id: Some(publisher.id),
        };
        let article = f.articles.create(journalist.id, &fields).await.unwrap();

        let mailer = Arc::new(RecordingMailer::default());
        let report = dispatcher(&f, mailer.clone()).dispatch(&article).await.unwrap();

        assert_eq!(report.attempted, 3);
        assert_eq!(report.delivered, 3);
        assert_eq!(report.failed, 0);

        let sent = mailer.sent.lock().unwrap();
        let mut to: Vec<&str> = sent.iter().map(|m| m.to.as_str()).collect();
        to.sort();
        assert_eq!(to, vec!["amy@example.com", "bob@example.com", "pat@example.com"]);
        assert!(sent.iter().all(|m| m.subject == "New Article: Breaking"));
        assert!(sent[0]
            .body
            .contains(&format!("https://news.example/articles/{}/", article.id)));
    }

    #[tokio::test]
    async fn test_failed_delivery_does_not_stop_others() {
        let f = setup().await;
        let journalist = user(&f, "jane", Role::Journalist).await;
        let good = user(&f, "bob", Role::Reader).await;
        let bad = user(&f, "pat", Role::Reader).await;
        for reader in [&good, &bad] {
            f.subscriptions
                .toggle(reader.id, SubscriptionTarget::Journalist(journalist.id))
                .await
                .unwrap();
        }
        let fields = ArticleFields {
            title: "Story".into(),
            content: "Body".into(),
            publisher_id: None,
        };
        let article = f.articles.create(journalist.id, &fields).await.unwrap();

        let mailer = Arc::new(RecordingMailer {
            failing: vec!["pat@example.com".into()],
            ..Default::default()
        });
        let report = dispatcher(&f, mailer.clone()).dispatch(&article).await.unwrap();

        assert_eq!(report.attempted, 2);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(mailer.sent.lock().unwrap()[0].to, "bob@example.com");
    }

    #[test]
    fn test_compose_truncates_excerpt() {
        let now = chrono::Utc::now();
        let article = Article {
            id: 7,
            title: "Title".into(),
            content: "a".repeat(300),
            author_id: 1,
            author_username: "jane".into(),
            publisher_id: None,
            publisher_name: None,
            status: crate::models::ArticleStatus::Approved,
            reviewed_by: None,
            reviewed_at: None,
            created_at: now,
            updated_at: now,
        };
        let recipient = Recipient {
            user_id: 2,
            username: "bob".into(),
            email: "bob@example.com".into(),
        };

        let mail = compose_approval_mail(&article, &recipient, "http://localhost:8080");
        assert!(mail.body.contains(&format!("{}...", "a".repeat(200))));
        assert!(!mail.body.contains(&"a".repeat(201)));
        assert!(mail.body.contains("Author: jane"));
        assert!(mail.body.contains("http://localhost:8080/articles/7/"));
    }
}
