//! Shortfall guardian
//!
//! Consumes shortfall events from the cashflow sentinel and turns them
//! into guardian-alert nudges. Re-emission inside the 6-hour window
//! refreshes the existing pending alert in place.

use serde_json::json;

use crate::error::Result;
use crate::models::NewNudge;
use crate::nudge::NudgeType;
use crate::risk;

use super::{AgentContext, ShortfallEvent};

/// Suppression window for repeated alerts
const WINDOW_HOURS: i64 = 6;

pub struct ShortfallGuardian;

impl ShortfallGuardian {
    pub fn new() -> Self {
        Self
    }

    /// Turn one shortfall event into (at most) one pending alert.
    /// Returns the number of nudges created or refreshed.
    pub async fn handle(&self, ctx: &AgentContext<'_>, event: &ShortfallEvent) -> Result<usize> {
        let balance = ctx.db.total_balance(event.user_id)?;
        let transactions = ctx.db.list_recent_transactions(event.user_id, 100)?;
        let emi = risk::check_emi_at_risk_from(&transactions, balance, ctx.now.date_naive());
        let next_bill = ctx
            .db
            .bills_due_within(event.user_id, 7)?
            .into_iter()
            .next();

        let mut message = format!(
            "Your cash flow is heading for trouble: projected balance {} with a {} outlook.",
            event.predicted_balance, event.risk_level
        );
        if emi.at_risk {
            message.push_str(&format!(
                " Payments of {} are due this week against a projected low of {}.",
                emi.total_emi, emi.min_predicted
            ));
        }
        if let Some(bill) = &next_bill {
            message.push_str(&format!(" {} ({}) is due {}.", bill.name, bill.amount, bill.next_due_date));
        }
        message.push_str(" Pause discretionary spend or move the gap from savings now.");

        let amount = if emi.at_risk {
            emi.shortfall
        } else {
            event.predicted_balance.min(crate::money::Money::ZERO).abs()
        };

        let bucket = ctx.now.timestamp() / (WINDOW_HOURS * 3600);
        let nudge = NewNudge::new(
            event.user_id,
            NudgeType::GuardianAlert,
            message,
            event.summary.clone(),
            event.severity.priority(),
            ctx.now + NudgeType::GuardianAlert.default_ttl(),
        )
        .with_amount(amount)
        .with_metadata(json!({
            "severity": event.severity,
            "critical_dates": event.critical_dates,
            "confidence": event.confidence,
        }))
        .automated()
        .with_dedupe_key(format!("guardian:{}:{}", event.user_id, bucket));

        ctx.lifecycle.create(nudge)?;
        Ok(1)
    }
}

impl Default for ShortfallGuardian {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{AccountKind, RiskLevel};
    use crate::money::Money;
    use crate::notify::LogNotifier;
    use crate::nudge::NudgeLifecycle;
    use crate::agents::Severity;
    use chrono::Utc;

    fn event(user_id: i64, severity: Severity) -> ShortfallEvent {
        ShortfallEvent {
            user_id,
            severity,
            risk_level: RiskLevel::Danger,
            risk_score: 85,
            predicted_balance: Money::from_major(-200),
            critical_dates: vec![],
            summary: "projected shortfall".into(),
            confidence: 60.0,
        }
    }

    #[tokio::test]
    async fn test_severity_maps_to_priority_and_window_dedupes() {
        let db = Database::in_memory().unwrap();
        db.create_account(1, "Main", AccountKind::Checking, Money::from_major(300), true)
            .unwrap();
        let lifecycle = NudgeLifecycle::new(db.clone());
        let notifier = LogNotifier;
        let ctx = AgentContext {
            db: &db,
            lifecycle: &lifecycle,
            notifier: &notifier,
            now: Utc::now(),
        };

        let guardian = ShortfallGuardian::new();
        guardian.handle(&ctx, &event(1, Severity::High)).await.unwrap();
        guardian.handle(&ctx, &event(1, Severity::Critical)).await.unwrap();

        // One alert, refreshed to the later severity's priority
        let alerts: Vec<_> = db
            .list_nudge_history(1, 10)
            .unwrap()
            .into_iter()
            .filter(|n| n.nudge_type == NudgeType::GuardianAlert)
            .collect();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].priority, 10);
        // Without EMIs at risk, the alert sizes to the projected deficit
        assert_eq!(alerts[0].amount, Some(Money::from_major(200)));
    }
}
