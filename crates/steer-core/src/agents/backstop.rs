//! Goal backstop
//!
//! Daily pass over active goals. A goal earns its target linearly
//! between creation and its deadline; when actual savings trail that
//! schedule by more than the tolerance, the agent proposes a top-up
//! sized to close the gap. The per-goal, per-date dedupe key gives the
//! 24-hour suppression window.

use async_trait::async_trait;
use serde_json::json;

use crate::error::Result;
use crate::models::{Goal, NewNudge};
use crate::money::Money;
use crate::nudge::NudgeType;

use super::{Agent, AgentContext, AgentReport};

/// Allowed slippage before a goal counts as behind, as a share of target
const TOLERANCE_PCT: i64 = 12;
/// Largest single top-up the agent will propose
const MAX_TOP_UP: Money = Money::from_major(20_000);

pub struct GoalBackstopAgent;

impl GoalBackstopAgent {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GoalBackstopAgent {
    fn default() -> Self {
        Self::new()
    }
}

/// Where the goal should be today if savings accrued linearly from
/// creation to the deadline. Past-deadline goals expect the full target.
fn expected_progress(goal: &Goal, now: chrono::DateTime<chrono::Utc>) -> Money {
    let start = goal.created_at.date_naive();
    let today = now.date_naive();
    let total_days = (goal.target_date - start).num_days();
    if total_days <= 0 || today >= goal.target_date {
        return goal.target_amount;
    }

    let elapsed_days = (today - start).num_days().max(0);
    goal.target_amount.ratio(elapsed_days, total_days)
}

#[async_trait]
impl Agent for GoalBackstopAgent {
    fn id(&self) -> &'static str {
        "backstop"
    }

    fn name(&self) -> &'static str {
        "Goal backstop"
    }

    async fn run(&self, ctx: &AgentContext<'_>, user_id: i64) -> Result<AgentReport> {
        let mut created = 0;

        for goal in ctx.db.list_active_goals(user_id)? {
            let expected = expected_progress(&goal, ctx.now);
            let gap = expected.saturating_sub(goal.saved_amount);
            if gap <= goal.target_amount.percent(TOLERANCE_PCT) {
                continue;
            }

            let top_up = gap.min(MAX_TOP_UP);
            let nudge = NewNudge::new(
                user_id,
                NudgeType::GoalBackstop,
                format!(
                    "\"{}\" is {} behind schedule. A top-up of {} puts it back on track \
                     for {}.",
                    goal.name, gap, top_up, goal.target_date
                ),
                format!(
                    "Saved {} of the {} expected by now toward {}",
                    goal.saved_amount, expected, goal.target_amount
                ),
                7,
                ctx.now + NudgeType::GoalBackstop.default_ttl(),
            )
            .with_amount(top_up)
            .with_metadata(json!({
                "goal_id": goal.id,
                "expected": expected,
                "gap": gap,
            }))
            .automated()
            .with_dedupe_key(format!("backstop:{}:{}", goal.id, ctx.now.date_naive()));

            ctx.lifecycle.create(nudge)?;
            created += 1;
        }

        Ok(AgentReport::created(created))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::AccountKind;
    use crate::notify::LogNotifier;
    use crate::nudge::NudgeLifecycle;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_behind_goal_gets_capped_top_up() {
        let db = Database::in_memory().unwrap();
        db.create_account(1, "Main", AccountKind::Checking, Money::from_major(5000), true)
            .unwrap();
        // Deadline 100 days out, nothing saved. Halfway through the
        // schedule the expected progress is half the target.
        let goal_id = db
            .create_goal(1, "House", Money::from_major(100_000), Utc::now().date_naive() + Duration::days(100))
            .unwrap();

        let lifecycle = NudgeLifecycle::new(db.clone());
        let notifier = LogNotifier;
        let now = Utc::now() + Duration::days(50);
        let ctx = AgentContext {
            db: &db,
            lifecycle: &lifecycle,
            notifier: &notifier,
            now,
        };

        let agent = GoalBackstopAgent::new();
        let report = agent.run(&ctx, 1).await.unwrap();
        assert_eq!(report.nudges_created, 1);

        // Gap is 50000 but the proposal caps at 20000
        let nudges: Vec<_> = db
            .list_nudge_history(1, 10)
            .unwrap()
            .into_iter()
            .filter(|n| n.nudge_type == NudgeType::GoalBackstop)
            .collect();
        assert_eq!(nudges.len(), 1);
        assert_eq!(nudges[0].amount, Some(Money::from_major(20_000)));
        assert_eq!(nudges[0].metadata["goal_id"], goal_id);

        // Same-day rerun refreshes the pending nudge in place
        let report = agent.run(&ctx, 1).await.unwrap();
        assert_eq!(report.nudges_created, 1);
        assert_eq!(db.list_nudge_history(1, 10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_on_track_goal_is_left_alone() {
        let db = Database::in_memory().unwrap();
        db.create_account(1, "Main", AccountKind::Checking, Money::from_major(5000), true)
            .unwrap();
        let goal_id = db
            .create_goal(1, "Laptop", Money::from_major(1000), Utc::now().date_naive() + Duration::days(100))
            .unwrap();
        // Ahead of any early-schedule expectation
        db.add_to_goal(goal_id, Money::from_major(400)).unwrap();

        let lifecycle = NudgeLifecycle::new(db.clone());
        let notifier = LogNotifier;
        let ctx = AgentContext {
            db: &db,
            lifecycle: &lifecycle,
            notifier: &notifier,
            now: Utc::now() + Duration::days(10),
        };

        let report = GoalBackstopAgent::new().run(&ctx, 1).await.unwrap();
        assert_eq!(report.nudges_created, 0);
    }
}
