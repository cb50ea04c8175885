//! In-process content event bus
//!
//! Services publish [`ContentEvent`]s after their writes commit; handlers such
//! as the notification dispatcher subscribe by [`EventKind`]. Handlers run in
//! priority order and their failures are logged, never returned to the
//! publisher.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::models::Article;

/// Handler priority (lower = earlier)
pub const PRIORITY_DEFAULT: i32 = 0;
pub const PRIORITY_LATE: i32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ArticleApproved,
}

#[derive(Debug, Clone)]
pub enum ContentEvent {
    /// An article moved from pending to approved
    ArticleApproved { article: Article, reviewer_id: i64 },
}

impl ContentEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ContentEvent::ArticleApproved { .. } => EventKind::ArticleApproved,
        }
    }
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    async fn handle(&self, event: &ContentEvent) -> anyhow::Result<()>;
}

struct Registered {
    handler: Arc<dyn EventHandler>,
    priority: i32,
}

#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<EventKind, Vec<Arc<Registered>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, kind: EventKind, handler: Arc<dyn EventHandler>, priority: i32) {
        let name = handler.name().to_string();
        let mut handlers = self.handlers.write().await;
        let list = handlers.entry(kind).or_default();
        list.push(Arc::new(Registered { handler, priority }));
        list.sort_by_key(|r| r.priority);

        debug!("Registered event handler '{}' for {:?} with priority {}", name, kind, priority);
    }

    /// Deliver an event to every handler subscribed to its kind.
    ///
    /// Returns the number of handlers that failed.
    pub async fn publish(&self, event: ContentEvent) -> usize {
        let kind = event.kind();
        // Snapshot so handlers may subscribe without deadlocking
        let handlers: Vec<Arc<Registered>> = self
            .handlers
            .read()
            .await
            .get(&kind)
            .cloned()
            .unwrap_or_default();

        let mut failures = 0;
        for registered in handlers {
            if let Err(e) = registered.handler.handle(&event).await {
                failures += 1;
                warn!(
                    handler = registered.handler.name(),
                    event = ?kind,
                    "Event handler failed: {:#}",
                    e
                );
            }
        }
        failures
    }
}
