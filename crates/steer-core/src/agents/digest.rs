//! Nightly digest
//!
//! One summary notification per user covering the last 24 hours of
//! automated activity. Users with nothing to report get nothing.

use async_trait::async_trait;
use chrono::Duration;
use serde_json::json;

use crate::error::Result;
use crate::models::NudgeStatus;
use crate::money::Money;
use crate::notify::Notification;

use super::{Agent, AgentContext, AgentReport};

const LOOKBACK_HOURS: i64 = 24;
const HISTORY_LIMIT: u32 = 100;

pub struct NightlyDigestAgent;

impl NightlyDigestAgent {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NightlyDigestAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for NightlyDigestAgent {
    fn id(&self) -> &'static str {
        "digest"
    }

    fn name(&self) -> &'static str {
        "Nightly digest"
    }

    async fn run(&self, ctx: &AgentContext<'_>, user_id: i64) -> Result<AgentReport> {
        let since = ctx.now - Duration::hours(LOOKBACK_HOURS);
        let recent: Vec<_> = ctx
            .db
            .list_nudge_history(user_id, HISTORY_LIMIT)?
            .into_iter()
            .filter(|n| n.automated && n.created_at >= since)
            .collect();
        if recent.is_empty() {
            return Ok(AgentReport::none());
        }

        let executed = recent
            .iter()
            .filter(|n| n.status == NudgeStatus::Executed)
            .count();
        let pending = recent
            .iter()
            .filter(|n| n.status == NudgeStatus::Pending)
            .count();
        let moved: Money = recent
            .iter()
            .filter(|n| n.status == NudgeStatus::Executed)
            .filter_map(|n| n.amount)
            .sum();

        let lines: Vec<String> = recent
            .iter()
            .map(|n| format!("{}: {}", n.nudge_type, n.message))
            .collect();

        ctx.notifier
            .send(Notification {
                user_id,
                subject: format!(
                    "Your last 24 hours: {} automated action(s), {} moved",
                    recent.len(),
                    moved
                ),
                template: "nightly-digest".into(),
                data: json!({
                    "total": recent.len(),
                    "executed": executed,
                    "pending": pending,
                    "amount_moved": moved,
                    "lines": lines,
                }),
            })
            .await;

        Ok(AgentReport::none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{AccountKind, NewNudge};
    use crate::notify::Notifier;
    use crate::nudge::{NudgeLifecycle, NudgeType};
    use chrono::Utc;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CapturingNotifier {
        sent: Mutex<Vec<Notification>>,
    }

    #[async_trait]
    impl Notifier for CapturingNotifier {
        async fn send(&self, notification: Notification) {
            self.sent.lock().unwrap().push(notification);
        }
    }

    #[tokio::test]
    async fn test_digest_summarizes_automated_activity() {
        let db = Database::in_memory().unwrap();
        db.create_account(1, "Main", AccountKind::Checking, Money::from_major(5000), true)
            .unwrap();
        let lifecycle = NudgeLifecycle::new(db.clone());

        let nudge = NewNudge::new(
            1,
            NudgeType::MicroSave,
            "saved for you",
            "autopilot",
            6,
            Utc::now() + Duration::hours(48),
        )
        .with_amount(Money::from_major(100))
        .automated();
        let created = lifecycle.create(nudge).unwrap();
        lifecycle.accept(1, created.id).unwrap();

        // Manual nudges stay out of the digest
        let manual = NewNudge::new(
            1,
            NudgeType::SpendingAlert,
            "watch dining",
            "category alert",
            2,
            Utc::now() + Duration::hours(48),
        );
        lifecycle.create(manual).unwrap();

        let notifier = CapturingNotifier::default();
        let ctx = AgentContext {
            db: &db,
            lifecycle: &lifecycle,
            notifier: &notifier,
            now: Utc::now(),
        };

        NightlyDigestAgent::new().run(&ctx, 1).await.unwrap();

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].template, "nightly-digest");
        assert_eq!(sent[0].data["total"], 1);
        assert_eq!(sent[0].data["executed"], 1);
    }

    #[tokio::test]
    async fn test_quiet_day_sends_nothing() {
        let db = Database::in_memory().unwrap();
        db.create_account(1, "Main", AccountKind::Checking, Money::from_major(5000), true)
            .unwrap();
        let lifecycle = NudgeLifecycle::new(db.clone());
        let notifier = CapturingNotifier::default();
        let ctx = AgentContext {
            db: &db,
            lifecycle: &lifecycle,
            notifier: &notifier,
            now: Utc::now(),
        };

        NightlyDigestAgent::new().run(&ctx, 1).await.unwrap();
        assert!(notifier.sent.lock().unwrap().is_empty());
    }
}
