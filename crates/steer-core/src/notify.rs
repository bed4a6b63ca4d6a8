//! Outbound notification seam
//!
//! Delivery is out of scope for the engine; agents hand alerts to a
//! `Notifier` and move on. The default implementation writes structured
//! log lines, which is also what the tests assert against indirectly
//! (no delivery side effects).

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

/// A notification ready for delivery
#[derive(Debug, Clone)]
pub struct Notification {
    pub user_id: i64,
    pub subject: String,
    pub template: String,
    pub data: Value,
}

/// Fire-and-forget notification sink
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: Notification);
}

/// Default sink: structured log output only
#[derive(Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: Notification) {
        info!(
            user_id = notification.user_id,
            subject = %notification.subject,
            template = %notification.template,
            "notification emitted"
        );
    }
}
