//! Micro-save autopilot
//!
//! For users who opted in, quietly moves a small, capped amount into
//! savings. The amount is the safe-to-save estimate bounded by the
//! frequency tier's daily and weekly caps, net of micro-saves already
//! executed in those windows. The per-date dedupe key makes the job
//! run-once-per-day under at-least-once scheduling.

use async_trait::async_trait;
use chrono::Duration;
use serde_json::json;

use crate::error::Result;
use crate::forecast;
use crate::models::{NewNudge, NudgeStatus};
use crate::money::Money;
use crate::nudge::NudgeType;

use super::{Agent, AgentContext, AgentReport};

/// Smallest transfer worth making
const MIN_ALLOCATABLE: Money = Money::from_major(50);
/// Ceiling on a single automated micro-save
const MAX_SINGLE_SAVE: Money = Money::from_major(120);

pub struct MicroSaveAutopilot;

impl MicroSaveAutopilot {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MicroSaveAutopilot {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for MicroSaveAutopilot {
    fn id(&self) -> &'static str {
        "autopilot"
    }

    fn name(&self) -> &'static str {
        "Micro-save autopilot"
    }

    async fn run(&self, ctx: &AgentContext<'_>, user_id: i64) -> Result<AgentReport> {
        let profile = ctx.db.get_profile(user_id)?;
        if !profile.auto_nudge_enabled {
            return Ok(AgentReport::none());
        }

        // Settled already today, under at-least-once scheduling
        let dedupe_key = format!("autopilot:{}:{}", user_id, ctx.now.date_naive());
        if ctx
            .db
            .find_nudge_by_dedupe_key(&dedupe_key)?
            .is_some_and(|n| n.status != NudgeStatus::Pending)
        {
            return Ok(AgentReport::none());
        }

        let balance = ctx.db.total_balance(user_id)?;
        let transactions = ctx.db.list_recent_transactions(user_id, 100)?;
        if transactions.is_empty() {
            return Ok(AgentReport::none());
        }

        let forecast = forecast::project_from(&transactions, balance, 7, ctx.now.date_naive());
        let estimate = forecast
            .rates
            .daily_net
            .clamp(MIN_ALLOCATABLE, MAX_SINGLE_SAVE);

        let (daily_cap, weekly_cap) = profile.frequency_pref.autopilot_caps();
        let saved_today = ctx.db.executed_amount_since(
            user_id,
            NudgeType::MicroSave,
            ctx.now - Duration::hours(24),
        )?;
        let saved_this_week = ctx.db.executed_amount_since(
            user_id,
            NudgeType::MicroSave,
            ctx.now - Duration::days(7),
        )?;

        let allocatable = estimate
            .min(daily_cap.saturating_sub(saved_today))
            .min(weekly_cap.saturating_sub(saved_this_week));
        if allocatable < MIN_ALLOCATABLE {
            return Ok(AgentReport::none());
        }

        let nudge = NewNudge::new(
            user_id,
            NudgeType::MicroSave,
            format!("Autopilot set aside {} for you today.", allocatable),
            "Daily micro-save within your autopilot caps".to_string(),
            6,
            ctx.now + NudgeType::MicroSave.default_ttl(),
        )
        .with_amount(allocatable)
        .with_metadata(json!({
            "daily_cap": daily_cap,
            "weekly_cap": weekly_cap,
            "saved_today": saved_today,
        }))
        .automated()
        .with_dedupe_key(dedupe_key);

        // Creation auto-accepts for opted-in users; an execution
        // failure leaves the nudge pending and is not ours to retry
        let created = ctx.lifecycle.create(nudge)?;
        Ok(AgentReport::created(
            (created.status == NudgeStatus::Executed) as usize,
        ))
    }
}
