//! Spending guardrail
//!
//! Four-hourly pass comparing each category's trailing-7-day spend to
//! its 4-week baseline. Fires when the week runs at 1.3x the baseline
//! or more and the absolute spend is large enough to matter. The
//! dedupe key buckets time in 2-day windows so a hot category alerts
//! at most every other day.

use async_trait::async_trait;
use chrono::Duration;
use serde_json::json;
use std::collections::HashMap;
use tracing::info;

use crate::error::Result;
use crate::models::NewNudge;
use crate::money::Money;
use crate::nudge::NudgeType;

use super::{Agent, AgentContext, AgentReport};

/// Weekly spend below this never alerts, whatever the acceleration
const MIN_WEEKLY_SPEND: Money = Money::from_major(1500);
/// Acceleration threshold as a ratio numerator over 10
const ACCELERATION_NUM: i128 = 13;
/// Suppression bucket width for the dedupe key
const SUPPRESS_SECS: i64 = 2 * 86_400;

/// Categories the guardrail never locks a budget over
const ESSENTIAL_CATEGORIES: &[&str] = &[
    "rent",
    "bills",
    "utilities",
    "groceries",
    "emi",
    "insurance",
    "savings",
];

pub struct SpendingGuardrailAgent;

impl SpendingGuardrailAgent {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SpendingGuardrailAgent {
    fn default() -> Self {
        Self::new()
    }
}

fn is_discretionary(category: &str) -> bool {
    !ESSENTIAL_CATEGORIES.contains(&category)
}

/// `weekly >= 1.3 * baseline`, in minor units to avoid float drift.
/// A zero baseline with qualifying spend counts as accelerating.
fn accelerating(weekly: Money, baseline: Money) -> bool {
    if baseline.is_zero() {
        return true;
    }
    weekly.minor() as i128 * 10 >= baseline.minor() as i128 * ACCELERATION_NUM
}

#[async_trait]
impl Agent for SpendingGuardrailAgent {
    fn id(&self) -> &'static str {
        "guardrail"
    }

    fn name(&self) -> &'static str {
        "Spending guardrail"
    }

    async fn run(&self, ctx: &AgentContext<'_>, user_id: i64) -> Result<AgentReport> {
        let week_start = ctx.now - Duration::days(7);
        let baseline_start = week_start - Duration::days(28);

        let weekly = ctx.db.category_spend_between(user_id, week_start, ctx.now)?;
        let baseline: HashMap<String, Money> = ctx
            .db
            .category_spend_between(user_id, baseline_start, week_start)?
            .into_iter()
            .map(|(category, total)| (category, total.div(4)))
            .collect();

        let profile = ctx.db.get_profile(user_id)?;
        let bucket = ctx.now.timestamp() / SUPPRESS_SECS;
        let mut created = 0;

        for (category, spent) in weekly {
            if spent < MIN_WEEKLY_SPEND {
                continue;
            }
            let base = baseline.get(&category).copied().unwrap_or(Money::ZERO);
            if !accelerating(spent, base) {
                continue;
            }

            // Auto mode locks the budget against further discretionary
            // spend; the nudge still goes out either way
            let locked = profile.auto_nudge_enabled
                && is_discretionary(&category)
                && ctx.db.get_budget(user_id)?.is_some();
            if locked {
                ctx.db.set_budget_locked(user_id, true)?;
                info!(user_id, category, "budget locked by spending guardrail");
            }

            let nudge = NewNudge::new(
                user_id,
                NudgeType::SpendingGuardrail,
                format!(
                    "Spending on {} hit {} this week against a {} weekly baseline. \
                     Slow it down before it eats your buffer.",
                    category, spent, base
                ),
                format!("{} is running well above its 4-week average", category),
                6,
                ctx.now + NudgeType::SpendingGuardrail.default_ttl(),
            )
            .with_amount(spent)
            .with_metadata(json!({
                "category": category,
                "weekly_spend": spent,
                "baseline": base,
                "budget_locked": locked,
            }))
            .automated()
            .with_dedupe_key(format!("guardrail:{}:{}:{}", user_id, category, bucket));

            ctx.lifecycle.create(nudge)?;
            created += 1;
        }

        Ok(AgentReport::created(created))
    }
}
