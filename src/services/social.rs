//! Social announcements for approved articles
//!
//! Posts a short note to the X/Twitter v2 API. Only registered when a bearer
//! token is configured; failures are logged by the event bus.

use crate::events::{ContentEvent, EventHandler};
use crate::models::Article;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

const TWEETS_URL: &str = "https://api.twitter.com/2/tweets";
const MAX_TWEET_CHARS: usize = 280;

/// Announcement text, cut to the platform limit
pub fn announcement_text(article: &Article) -> String {
    let text = format!(
        "New Article Published!\n\n{}\n\nBy: {}\n\n#News",
        article.title, article.author_username
    );
    if text.chars().count() <= MAX_TWEET_CHARS {
        return text;
    }
    let head: String = text.chars().take(MAX_TWEET_CHARS - 3).collect();
    format!("{}...", head)
}

pub struct TwitterAnnouncer {
    client: reqwest::Client,
    bearer_token: String,
    endpoint: String,
}

impl TwitterAnnouncer {
    pub fn new(bearer_token: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            bearer_token,
            endpoint: TWEETS_URL.to_string(),
        })
    }

    pub async fn announce(&self, article: &Article) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.bearer_token)
            .json(&json!({ "text": announcement_text(article) }))
            .send()
            .await
            .context("Failed to reach Twitter")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Tweet rejected with {}: {}", status, body));
        }

        tracing::info!(article_id = article.id, "Article announced on Twitter");
        Ok(())
    }
}

#[async_trait]
impl EventHandler for TwitterAnnouncer {
    fn name(&self) -> &str {
        "twitter_announcer"
    }

    async fn handle(&self, event: &ContentEvent) -> Result<()> {
        match event {
            ContentEvent::ArticleApproved { article, .. } => self.announce(article).await,
        }
    }
}
