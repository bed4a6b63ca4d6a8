//! Background scheduler for the automation agents
//!
//! Optional periodic agent passes enabled via environment variables:
//!
//! - `STEER_AGENT_SCHEDULE`: Interval in hours between periodic agent
//!   passes (e.g. "4"). Unset or "0" disables scheduling.
//! - `STEER_DIGEST_SCHEDULE`: Interval in hours between nightly digest
//!   passes (default: 24)
//!
//! A maintenance tick runs every hour regardless: it finalizes expired
//! nudges, releases overdue bill envelopes, and materializes due
//! recurring transactions.

use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tracing::{error, info, warn};

use steer_core::{AgentRunner, Database, NudgeLifecycle};

const MAINTENANCE_INTERVAL_SECS: u64 = 3600;

/// Configuration for scheduled agent passes
#[derive(Debug, Clone)]
pub struct AgentScheduleConfig {
    /// Interval between periodic agent passes in hours
    pub agent_interval_hours: u64,
    /// Interval between digest passes in hours
    pub digest_interval_hours: u64,
}

impl AgentScheduleConfig {
    /// Parse configuration from environment variables
    ///
    /// Returns None if scheduling is not configured (STEER_AGENT_SCHEDULE not set)
    pub fn from_env() -> Option<Self> {
        let agent_interval_hours: u64 = std::env::var("STEER_AGENT_SCHEDULE")
            .ok()
            .and_then(|s| s.parse().ok())?;

        if agent_interval_hours == 0 {
            warn!("STEER_AGENT_SCHEDULE is 0, scheduled agent passes disabled");
            return None;
        }

        let digest_interval_hours = std::env::var("STEER_DIGEST_SCHEDULE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(24);

        Some(Self {
            agent_interval_hours,
            digest_interval_hours,
        })
    }
}

/// Start the agent scheduler as a set of background tasks
pub fn start_agent_scheduler(db: Database, config: AgentScheduleConfig) {
    info!(
        "Starting agent scheduler: agents every {}h, digest every {}h",
        config.agent_interval_hours, config.digest_interval_hours
    );

    let runner_db = db.clone();
    let agent_interval = config.agent_interval_hours;
    tokio::spawn(async move {
        let runner = AgentRunner::new(runner_db);
        let mut ticker = interval(Duration::from_secs(agent_interval * 3600));

        // Skip the immediate first tick so startup stays quiet
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let summary = runner.run_all().await;
            info!(
                users = summary.users,
                nudges = summary.nudges_created,
                failures = summary.failures,
                "scheduled agent pass complete"
            );
        }
    });

    let digest_db = db.clone();
    let digest_interval = config.digest_interval_hours;
    tokio::spawn(async move {
        let runner = AgentRunner::new(digest_db);
        let mut ticker = interval(Duration::from_secs(digest_interval * 3600));
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let summary = runner.run_digest().await;
            info!(users = summary.users, failures = summary.failures, "digest pass complete");
        }
    });

    tokio::spawn(async move {
        let lifecycle = NudgeLifecycle::new(db.clone());
        let mut ticker = interval(Duration::from_secs(MAINTENANCE_INTERVAL_SECS));
        ticker.tick().await;

        loop {
            ticker.tick().await;
            run_maintenance(&db, &lifecycle);
        }
    });
}

/// One maintenance tick: expiry sweep, envelope release, recurring
/// materialization.
fn run_maintenance(db: &Database, lifecycle: &NudgeLifecycle) {
    let now = Utc::now();
    let today = now.date_naive();

    if let Err(e) = lifecycle.sweep_expired(now) {
        error!(error = %e, "expiry sweep failed");
    }
    if let Err(e) = db.release_expired_envelopes(today) {
        error!(error = %e, "envelope release failed");
    }

    match db.list_user_ids() {
        Ok(users) => {
            for user_id in users {
                // The watchdog lock also freezes recurring materialization;
                // due templates catch up after release
                match db.get_safety_state(user_id) {
                    Ok(state) if state.autopilot_locked => continue,
                    Ok(_) => {}
                    Err(e) => {
                        error!(user_id, error = %e, "cannot read safety state, skipping user");
                        continue;
                    }
                }
                match db.process_due_recurring(user_id, today) {
                    Ok(n) if n > 0 => {
                        info!(user_id, materialized = n, "recurring transactions materialized");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(user_id, error = %e, "recurring materialization failed");
                    }
                }
            }
        }
        Err(e) => error!(error = %e, "cannot list users for maintenance"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env_not_set() {
        // When STEER_AGENT_SCHEDULE is not set, should return None
        std::env::remove_var("STEER_AGENT_SCHEDULE");
        assert!(AgentScheduleConfig::from_env().is_none());
    }

    #[test]
    fn test_config_from_env_zero() {
        // When STEER_AGENT_SCHEDULE is 0, should return None
        std::env::set_var("STEER_AGENT_SCHEDULE", "0");
        assert!(AgentScheduleConfig::from_env().is_none());
        std::env::remove_var("STEER_AGENT_SCHEDULE");
    }

    #[test]
    fn test_maintenance_respects_autopilot_lock() {
        use steer_core::models::{AccountKind, NewTransaction, RecurringInterval, TransactionKind};
        use steer_core::money::Money;

        let db = Database::in_memory().unwrap();
        db.create_account(1, "Main", AccountKind::Checking, Money::from_major(5000), true)
            .unwrap();
        // A monthly template due today; recording the seed instance
        // already settled the balance to 4900
        db.record_transaction(
            1,
            &NewTransaction {
                account_id: 1,
                kind: TransactionKind::Expense,
                amount: Money::from_major(100),
                category: "rent".into(),
                description: "rent".into(),
                date: Utc::now() - chrono::Duration::days(30),
                is_recurring: true,
                recurring_interval: Some(RecurringInterval::Monthly),
                next_recurring_date: Some(Utc::now().date_naive()),
            },
        )
        .unwrap();
        let lifecycle = NudgeLifecycle::new(db.clone());

        db.set_autopilot_lock(1, true, Some("manual review"), Utc::now())
            .unwrap();
        run_maintenance(&db, &lifecycle);
        assert_eq!(db.total_balance(1).unwrap(), Money::from_major(4900));

        // A released lock lets the due template catch up
        db.set_autopilot_lock(1, false, None, Utc::now()).unwrap();
        run_maintenance(&db, &lifecycle);
        assert_eq!(db.total_balance(1).unwrap(), Money::from_major(4800));
    }
}
