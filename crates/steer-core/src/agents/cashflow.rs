//! Predictive cashflow sentinel
//!
//! Daily forecast for every user: persists a risk snapshot, emits a
//! shortfall event when the outlook turns dangerous, and creates an
//! emergency nudge plus an alert when the projection crosses the
//! absolute critical floor.

use async_trait::async_trait;
use serde_json::json;

use crate::error::Result;
use crate::forecast;
use crate::models::{NewNudge, RiskLevel};
use crate::money::Money;
use crate::notify::Notification;
use crate::nudge::NudgeType;
use crate::risk;

use super::{Agent, AgentContext, AgentReport, Severity, ShortfallEvent};

/// Forecast horizon for the daily pass
const HORIZON_DAYS: u32 = 30;
/// Projected balance below this counts as a critical date
const CRITICAL_FLOOR: Money = Money::from_major(500);

pub struct CashflowAgent;

impl CashflowAgent {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CashflowAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for CashflowAgent {
    fn id(&self) -> &'static str {
        "cashflow"
    }

    fn name(&self) -> &'static str {
        "Predictive cashflow sentinel"
    }

    async fn run(&self, ctx: &AgentContext<'_>, user_id: i64) -> Result<AgentReport> {
        let balance = ctx.db.total_balance(user_id)?;
        let transactions = ctx.db.list_recent_transactions(user_id, 100)?;
        if transactions.is_empty() {
            return Ok(AgentReport::none());
        }

        let today = ctx.now.date_naive();
        let forecast = forecast::project_from(&transactions, balance, HORIZON_DAYS, today);
        let assessment = risk::score_forecast(&forecast, balance);
        ctx.db.insert_risk_snapshot(user_id, &assessment)?;

        let critical_dates = forecast.critical_dates(CRITICAL_FLOOR);
        let mut report = AgentReport::none();

        if assessment.level == RiskLevel::Danger || !critical_dates.is_empty() {
            report.events.push(ShortfallEvent {
                user_id,
                severity: Severity::from_score(assessment.score),
                risk_level: assessment.level,
                risk_score: assessment.score,
                predicted_balance: forecast.ending_predicted(),
                critical_dates: critical_dates.clone(),
                summary: assessment.drivers.join("; "),
                confidence: forecast.confidence,
            });
        }

        // Absolute floor breach: emergency nudge and an alert,
        // independent of the event path
        if forecast.min_predicted() < CRITICAL_FLOOR {
            let gap = CRITICAL_FLOOR - forecast.min_predicted();
            let first_breach = critical_dates.first().copied();

            let nudge = NewNudge::new(
                user_id,
                NudgeType::EmergencyBuffer,
                format!(
                    "Your balance is projected to fall to {} within {} days. \
                     Set aside {} now to stay above the floor.",
                    forecast.min_predicted(),
                    HORIZON_DAYS,
                    gap
                ),
                format!(
                    "Projected minimum {} is below the {} critical floor",
                    forecast.min_predicted(),
                    CRITICAL_FLOOR
                ),
                10,
                ctx.now + NudgeType::EmergencyBuffer.default_ttl(),
            )
            .with_amount(gap)
            .with_metadata(json!({
                "first_breach": first_breach,
                "risk_score": assessment.score,
            }))
            .automated()
            .with_dedupe_key(format!("cashflow:{}:{}", user_id, today));

            ctx.lifecycle.create(nudge)?;
            report.nudges_created += 1;

            ctx.notifier
                .send(Notification {
                    user_id,
                    subject: "Projected balance shortfall".into(),
                    template: "shortfall-alert".into(),
                    data: json!({
                        "min_predicted": forecast.min_predicted(),
                        "first_breach": first_breach,
                        "risk_level": assessment.level,
                    }),
                })
                .await;
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{AccountKind, NewTransaction, TransactionKind};
    use crate::notify::LogNotifier;
    use crate::nudge::NudgeLifecycle;
    use chrono::{Duration, Utc};

    fn ctx_parts(db: &Database) -> (NudgeLifecycle, LogNotifier) {
        (NudgeLifecycle::new(db.clone()), LogNotifier)
    }

    fn heavy_spender(db: &Database) -> i64 {
        db.create_account(1, "Main", AccountKind::Checking, Money::from_major(2000), true)
            .unwrap();
        // Steady heavy outflow, no income: projection dives fast
        for day in 1..30 {
            db.record_transaction(
                1,
                &NewTransaction {
                    account_id: 1,
                    kind: TransactionKind::Expense,
                    amount: Money::from_major(300),
                    category: "general".into(),
                    description: "spend".into(),
                    date: Utc::now() - Duration::days(day),
                    is_recurring: false,
                    recurring_interval: None,
                    next_recurring_date: None,
                },
            )
            .unwrap();
        }
        1
    }

    #[tokio::test]
    async fn test_dangerous_forecast_emits_event_and_nudge() {
        let db = Database::in_memory().unwrap();
        let user = heavy_spender(&db);
        let (lifecycle, notifier) = ctx_parts(&db);
        let ctx = AgentContext {
            db: &db,
            lifecycle: &lifecycle,
            notifier: &notifier,
            now: Utc::now(),
        };

        let report = CashflowAgent::new().run(&ctx, user).await.unwrap();
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.nudges_created, 1);
        assert!(!db.list_risk_snapshots(user, 5).unwrap().is_empty());

        // Same-day rerun refreshes the dedupe-keyed nudge instead of
        // duplicating it
        let report = CashflowAgent::new().run(&ctx, user).await.unwrap();
        assert_eq!(report.nudges_created, 1);
        let emergency: Vec<_> = db
            .list_nudge_history(user, 50)
            .unwrap()
            .into_iter()
            .filter(|n| n.nudge_type == NudgeType::EmergencyBuffer)
            .collect();
        assert_eq!(emergency.len(), 1);
        assert!(emergency[0].automated);
    }

    #[tokio::test]
    async fn test_healthy_user_stays_quiet() {
        let db = Database::in_memory().unwrap();
        db.create_account(1, "Main", AccountKind::Checking, Money::from_major(50_000), true)
            .unwrap();
        db.record_transaction(
            1,
            &NewTransaction {
                account_id: 1,
                kind: TransactionKind::Income,
                amount: Money::from_major(3000),
                category: "salary".into(),
                description: "salary".into(),
                date: Utc::now() - Duration::days(5),
                is_recurring: false,
                recurring_interval: None,
                next_recurring_date: None,
            },
        )
        .unwrap();

        let (lifecycle, notifier) = ctx_parts(&db);
        let ctx = AgentContext {
            db: &db,
            lifecycle: &lifecycle,
            notifier: &notifier,
            now: Utc::now(),
        };

        let report = CashflowAgent::new().run(&ctx, 1).await.unwrap();
        assert!(report.events.is_empty());
        assert_eq!(report.nudges_created, 0);
    }
}
