//! Scheduled automation agents
//!
//! Each agent composes the forecast, risk, and nudge layers into an
//! unattended job. Agents are invoked by an external scheduler; the
//! runner fans out over users, skips anyone whose autopilot is locked,
//! and never lets one user's failure abort the batch.
//!
//! Idempotence under at-least-once delivery comes from the nudge
//! dedupe keys: every agent encodes its suppression window into the
//! key, so re-running the same window refreshes instead of duplicating.
//!
//! ## Built-in agents
//!
//! - **Cashflow sentinel** (daily) - forecasts every user, snapshots
//!   risk, and emits shortfall events
//! - **Shortfall guardian** (event-driven) - turns shortfall events
//!   into guardian-alert nudges
//! - **Micro-save autopilot** (event-driven) - creates and immediately
//!   executes capped micro-saves for opted-in users
//! - **Spending guardrail** (every 4 hours) - flags category spend
//!   accelerating against its baseline
//! - **Goal backstop** (daily) - tops up goals behind schedule
//! - **Nightly digest** (daily) - one summary notification of the last
//!   day's automated activity

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::db::Database;
use crate::models::RiskLevel;
use crate::money::Money;
use crate::notify::{LogNotifier, Notifier};
use crate::nudge::NudgeLifecycle;

mod autopilot;
mod backstop;
mod cashflow;
mod digest;
mod guardian;
mod guardrail;

pub use autopilot::MicroSaveAutopilot;
pub use backstop::GoalBackstopAgent;
pub use cashflow::CashflowAgent;
pub use digest::NightlyDigestAgent;
pub use guardian::ShortfallGuardian;
pub use guardrail::SpendingGuardrailAgent;

/// Shortfall severity, mapped onto nudge priority by the guardian
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn priority(&self) -> i32 {
        match self {
            Self::Low => 4,
            Self::Medium => 6,
            Self::High => 8,
            Self::Critical => 10,
        }
    }

    /// Classify from a 0-100 risk score
    pub fn from_score(score: u8) -> Severity {
        if score >= 90 {
            Self::Critical
        } else if score >= 70 {
            Self::High
        } else if score >= 50 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Emitted by the cashflow sentinel when a user's forecast turns
/// critical; consumed by the shortfall guardian.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortfallEvent {
    pub user_id: i64,
    pub severity: Severity,
    pub risk_level: RiskLevel,
    pub risk_score: u8,
    pub predicted_balance: Money,
    pub critical_dates: Vec<NaiveDate>,
    pub summary: String,
    pub confidence: f64,
}

/// Everything an agent needs for one run
pub struct AgentContext<'a> {
    pub db: &'a Database,
    pub lifecycle: &'a NudgeLifecycle,
    pub notifier: &'a dyn Notifier,
    pub now: DateTime<Utc>,
}

/// Result of one agent run for one user
#[derive(Debug, Clone, Default)]
pub struct AgentReport {
    pub nudges_created: usize,
    pub events: Vec<ShortfallEvent>,
}

impl AgentReport {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn created(n: usize) -> Self {
        Self {
            nudges_created: n,
            events: Vec::new(),
        }
    }
}

/// Trait for scheduled automation agents
#[async_trait]
pub trait Agent: Send + Sync {
    /// Stable identifier, also used in dedupe keys and logs
    fn id(&self) -> &'static str;

    /// Human-readable name
    fn name(&self) -> &'static str;

    /// Run for one user
    async fn run(&self, ctx: &AgentContext<'_>, user_id: i64) -> crate::error::Result<AgentReport>;
}

/// Batch summary of one runner pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub users: usize,
    pub skipped_locked: usize,
    pub nudges_created: usize,
    pub events_handled: usize,
    pub failures: usize,
}

/// Fans the registered agents out over every known user
pub struct AgentRunner {
    db: Database,
    lifecycle: NudgeLifecycle,
    notifier: Arc<dyn Notifier>,
    agents: Vec<Box<dyn Agent>>,
    guardian: ShortfallGuardian,
}

impl AgentRunner {
    /// Runner with the built-in agent set and log-only notifications
    pub fn new(db: Database) -> Self {
        Self::with_notifier(db, Arc::new(LogNotifier))
    }

    pub fn with_notifier(db: Database, notifier: Arc<dyn Notifier>) -> Self {
        let lifecycle = NudgeLifecycle::new(db.clone());
        let agents: Vec<Box<dyn Agent>> = vec![
            Box::new(CashflowAgent::new()),
            Box::new(MicroSaveAutopilot::new()),
            Box::new(SpendingGuardrailAgent::new()),
            Box::new(GoalBackstopAgent::new()),
        ];

        Self {
            db,
            lifecycle,
            notifier,
            agents,
            guardian: ShortfallGuardian::new(),
        }
    }

    /// One full pass over all users and all periodic agents, with
    /// shortfall events routed to the guardian in the same pass.
    pub async fn run_all(&self) -> RunSummary {
        self.run_all_at(Utc::now()).await
    }

    pub async fn run_all_at(&self, now: DateTime<Utc>) -> RunSummary {
        let mut summary = RunSummary::default();

        let users = match self.db.list_user_ids() {
            Ok(users) => users,
            Err(e) => {
                warn!(error = %e, "agent pass aborted: cannot list users");
                summary.failures += 1;
                return summary;
            }
        };

        for user_id in users {
            summary.users += 1;
            // The watchdog lock short-circuits every automated path
            match self.db.get_safety_state(user_id) {
                Ok(state) if state.autopilot_locked => {
                    info!(user_id, reason = ?state.reason, "autopilot locked, skipping user");
                    summary.skipped_locked += 1;
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(user_id, error = %e, "cannot read safety state, skipping user");
                    summary.failures += 1;
                    continue;
                }
            }

            let ctx = AgentContext {
                db: &self.db,
                lifecycle: &self.lifecycle,
                notifier: self.notifier.as_ref(),
                now,
            };

            for agent in &self.agents {
                match agent.run(&ctx, user_id).await {
                    Ok(report) => {
                        summary.nudges_created += report.nudges_created;
                        for event in report.events {
                            match self.guardian.handle(&ctx, &event).await {
                                Ok(created) => {
                                    summary.events_handled += 1;
                                    summary.nudges_created += created;
                                }
                                Err(e) => {
                                    warn!(user_id, agent = agent.id(), error = %e, "guardian failed");
                                    summary.failures += 1;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        // One user's failure must not abort the batch
                        warn!(user_id, agent = agent.id(), error = %e, "agent run failed");
                        summary.failures += 1;
                    }
                }
            }
        }

        info!(
            users = summary.users,
            nudges = summary.nudges_created,
            events = summary.events_handled,
            failures = summary.failures,
            "agent pass complete"
        );

        summary
    }

    /// Run the nightly digest pass separately from the periodic agents
    pub async fn run_digest(&self) -> RunSummary {
        self.run_digest_at(Utc::now()).await
    }

    pub async fn run_digest_at(&self, now: DateTime<Utc>) -> RunSummary {
        let mut summary = RunSummary::default();
        let digest = NightlyDigestAgent::new();

        let users = match self.db.list_user_ids() {
            Ok(users) => users,
            Err(e) => {
                warn!(error = %e, "digest pass aborted: cannot list users");
                summary.failures += 1;
                return summary;
            }
        };

        for user_id in users {
            summary.users += 1;
            // The watchdog lock short-circuits every automated path
            match self.db.get_safety_state(user_id) {
                Ok(state) if state.autopilot_locked => {
                    info!(user_id, reason = ?state.reason, "autopilot locked, skipping user");
                    summary.skipped_locked += 1;
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(user_id, error = %e, "cannot read safety state, skipping user");
                    summary.failures += 1;
                    continue;
                }
            }

            let ctx = AgentContext {
                db: &self.db,
                lifecycle: &self.lifecycle,
                notifier: self.notifier.as_ref(),
                now,
            };
            if let Err(e) = digest.run(&ctx, user_id).await {
                warn!(user_id, error = %e, "digest failed");
                summary.failures += 1;
            }
        }

        summary
    }
}
