//! Nudge lifecycle management
//!
//! Sole owner of nudge state transitions. Accepting a money-moving
//! nudge runs its executor inside the same database transaction as the
//! status flip, so a failed transfer leaves the nudge pending and the
//! ledger untouched. The concurrent-accept race is resolved by the
//! conditional update in the db layer; this module never read-then-
//! writes a status.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::db::{self, Database};
use crate::error::{Error, Result};
use crate::models::{NewNudge, NewTransaction, NudgeAction, NudgeStatus, TransactionKind};
use crate::money::Money;
use crate::nudge::{NudgeType, PersonalizationFilter};

/// Aggregate nudge statistics for one user
#[derive(Debug, Clone, Serialize)]
pub struct NudgeMetrics {
    pub total: i64,
    pub executed: i64,
    pub rejected: i64,
    pub expired: i64,
    pub pending: i64,
    /// executed / total * 100, 0 when there is no history
    pub acceptance_rate: f64,
    /// Sum of measured impact over executed nudges
    pub total_impact: Money,
}

pub struct NudgeLifecycle {
    db: Database,
    personalize: PersonalizationFilter,
}

impl NudgeLifecycle {
    pub fn new(db: Database) -> Self {
        let personalize = PersonalizationFilter::new(db.clone());
        Self { db, personalize }
    }

    /// Persist a new nudge. When the user has auto-nudge enabled the
    /// fresh nudge is run through `accept` immediately; an execution
    /// failure there is logged and the nudge returned pending rather
    /// than failing creation.
    pub fn create(&self, new: NewNudge) -> Result<NudgeAction> {
        let nudge = self.db.upsert_nudge(&new)?;

        let profile = self.db.get_profile(nudge.user_id)?;
        if profile.auto_nudge_enabled && nudge.status == NudgeStatus::Pending {
            match self.accept(nudge.user_id, nudge.id) {
                Ok(executed) => return Ok(executed),
                Err(e) => {
                    warn!(
                        nudge_id = nudge.id,
                        error = %e,
                        "auto-accept failed, leaving nudge pending"
                    );
                }
            }
        }

        Ok(nudge)
    }

    /// Accept a pending nudge: run its type's executor and move it to
    /// executed, atomically.
    pub fn accept(&self, user_id: i64, nudge_id: i64) -> Result<NudgeAction> {
        let now = Utc::now();
        let db = &self.db;

        let nudge = db.transition_nudge(user_id, nudge_id, NudgeStatus::Executed, now, |tx, nudge| {
            if !nudge.is_active(now) {
                return Err(Error::AlreadyProcessed(format!("nudge {} expired", nudge_id)));
            }
            let impact = self.execute(tx, nudge)?;
            Ok(Some(impact))
        })?;

        info!(
            user_id,
            nudge_id,
            nudge_type = %nudge.nudge_type,
            impact = ?nudge.impact,
            "nudge executed"
        );
        self.adjust_behavior(user_id);

        Ok(nudge)
    }

    /// Reject a pending nudge
    pub fn reject(&self, user_id: i64, nudge_id: i64) -> Result<NudgeAction> {
        let now = Utc::now();
        let nudge = self
            .db
            .transition_nudge(user_id, nudge_id, NudgeStatus::Rejected, now, |_, nudge| {
                if !nudge.is_active(now) {
                    return Err(Error::AlreadyProcessed(format!("nudge {} expired", nudge_id)));
                }
                Ok(None)
            })?;

        self.adjust_behavior(user_id);

        Ok(nudge)
    }

    /// Type-specific financial action, inside the transition's
    /// transaction. Returns the measured impact from the fixed table.
    fn execute(&self, tx: &rusqlite::Transaction<'_>, nudge: &NudgeAction) -> Result<Money> {
        let amount = nudge.amount.unwrap_or(Money::ZERO);

        match nudge.nudge_type {
            NudgeType::AutoSave | NudgeType::MicroSave | NudgeType::GoalBackstop => {
                self.execute_save(tx, nudge, amount)?;
            }
            NudgeType::BillPay => {
                self.execute_bill_pay(tx, nudge, amount)?;
            }
            NudgeType::BillGuard => {
                self.execute_bill_guard(tx, nudge, amount)?;
            }
            // Informational types execute as a no-op
            _ => {}
        }

        Ok(nudge.nudge_type.impact(amount))
    }

    /// Move the amount into savings: an expense against the default
    /// account, optionally credited to a goal named in the metadata.
    fn execute_save(
        &self,
        tx: &rusqlite::Transaction<'_>,
        nudge: &NudgeAction,
        amount: Money,
    ) -> Result<()> {
        if !amount.is_positive() {
            return Err(Error::Execution("save amount must be positive".into()));
        }
        let account = self
            .db
            .default_account(nudge.user_id)
            .map_err(|_| Error::Execution("no account to save from".into()))?;

        db::transactions::insert_transaction_tx(
            tx,
            nudge.user_id,
            &NewTransaction {
                account_id: account.id,
                kind: TransactionKind::Expense,
                amount,
                category: "savings".into(),
                description: format!("{} via nudge", nudge.nudge_type),
                date: Utc::now(),
                is_recurring: false,
                recurring_interval: None,
                next_recurring_date: None,
            },
        )?;
        db::transactions::adjust_balance_tx(tx, account.id, -amount)?;

        if let Some(goal_id) = nudge.metadata.get("goal_id").and_then(|v| v.as_i64()) {
            db::goals::add_to_goal_tx(tx, goal_id, amount)?;
        }

        Ok(())
    }

    /// Pay the referenced obligation now: ledger expense plus either a
    /// bill settlement or a recurring-template advance.
    fn execute_bill_pay(
        &self,
        tx: &rusqlite::Transaction<'_>,
        nudge: &NudgeAction,
        amount: Money,
    ) -> Result<()> {
        if !amount.is_positive() {
            return Err(Error::Execution("bill amount must be positive".into()));
        }
        let account = self
            .db
            .default_account(nudge.user_id)
            .map_err(|_| Error::Execution("no account to pay from".into()))?;

        db::transactions::insert_transaction_tx(
            tx,
            nudge.user_id,
            &NewTransaction {
                account_id: account.id,
                kind: TransactionKind::Expense,
                amount,
                category: "bills".into(),
                description: "early bill payment via nudge".into(),
                date: Utc::now(),
                is_recurring: false,
                recurring_interval: None,
                next_recurring_date: None,
            },
        )?;
        db::transactions::adjust_balance_tx(tx, account.id, -amount)?;

        if let Some(bill_id) = nudge.metadata.get("bill_id").and_then(|v| v.as_i64()) {
            db::bills::settle_bill_tx(tx, bill_id)?;
        } else if let Some(template_id) =
            nudge.metadata.get("transaction_id").and_then(|v| v.as_i64())
        {
            db::transactions::advance_recurring_tx(tx, template_id)?;
        }

        Ok(())
    }

    /// Place or refresh the envelope protecting the referenced bill.
    /// Guards over recurring templates have no bill row to hold
    /// against; the acceptance itself is the commitment.
    fn execute_bill_guard(
        &self,
        tx: &rusqlite::Transaction<'_>,
        nudge: &NudgeAction,
        amount: Money,
    ) -> Result<()> {
        let Some(bill_id) = nudge.metadata.get("bill_id").and_then(|v| v.as_i64()) else {
            return Ok(());
        };

        let locked_until = nudge
            .metadata
            .get("due_date")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| Utc::now().date_naive() + Duration::days(7));

        db::bills::upsert_envelope_tx(tx, bill_id, amount, locked_until)
    }

    /// Fire-and-forget behavior adjustment after a response
    fn adjust_behavior(&self, user_id: i64) {
        if let Err(e) = self.personalize.record_response(user_id) {
            warn!(user_id, error = %e, "behavior adjustment failed");
        }
    }

    /// Aggregate metrics over the user's whole nudge history
    pub fn metrics(&self, user_id: i64) -> Result<NudgeMetrics> {
        let (total, executed, rejected, expired, total_impact) =
            self.db.nudge_status_counts(user_id)?;

        let acceptance_rate = if total > 0 {
            executed as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        Ok(NudgeMetrics {
            total,
            executed,
            rejected,
            expired,
            pending: total - executed - rejected - expired,
            acceptance_rate,
            total_impact,
        })
    }

    /// Stamp expired status on overdue pending nudges. Read paths
    /// already filter by expiry; the sweep keeps history honest.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let swept = self.db.expire_overdue_nudges(now)?;
        if swept > 0 {
            info!(swept, "expired overdue nudges");
        }

        Ok(swept)
    }
}
