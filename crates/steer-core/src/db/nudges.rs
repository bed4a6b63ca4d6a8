//! Nudge persistence
//!
//! Three patterns live here and nowhere else:
//! - dedupe upsert: agents supply a `dedupe_key` encoding their
//!   suppression window; the UNIQUE constraint makes re-emission an
//!   idempotent refresh instead of a duplicate.
//! - CAS transitions: every status change is guarded by
//!   `WHERE status = 'pending'`, so concurrent accept/reject races
//!   resolve to exactly one winner.
//! - atomic execution: the money-moving executor runs inside the same
//!   SQLite transaction as the status flip; executor failure leaves the
//!   nudge pending.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row, TransactionBehavior};

use super::{fmt_datetime, parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{NewNudge, NudgeAction, NudgeStatus};
use crate::money::Money;
use crate::nudge::NudgeType;

fn row_to_nudge(row: &Row<'_>) -> rusqlite::Result<NudgeAction> {
    let type_str: String = row.get(2)?;
    let amount: Option<i64> = row.get(3)?;
    let status_str: String = row.get(7)?;
    let created_str: String = row.get(8)?;
    let responded_str: Option<String> = row.get(9)?;
    let executed_str: Option<String> = row.get(10)?;
    let expires_str: String = row.get(11)?;
    let impact: Option<i64> = row.get(12)?;
    let metadata_str: String = row.get(13)?;

    Ok(NudgeAction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        nudge_type: type_str.parse().unwrap_or(NudgeType::Summary),
        amount: amount.map(Money::from_minor),
        message: row.get(4)?,
        reason: row.get(5)?,
        priority: row.get(6)?,
        status: status_str.parse().unwrap_or(NudgeStatus::Expired),
        created_at: parse_datetime(&created_str),
        responded_at: responded_str.map(|s| parse_datetime(&s)),
        executed_at: executed_str.map(|s| parse_datetime(&s)),
        expires_at: parse_datetime(&expires_str),
        impact: impact.map(Money::from_minor),
        metadata: serde_json::from_str(&metadata_str).unwrap_or(serde_json::Value::Null),
        feedback_rating: row.get(14)?,
        was_helpful: row.get(15)?,
        dismiss_reason: row.get(16)?,
        automated: row.get(17)?,
        dedupe_key: row.get(18)?,
    })
}

const NUDGE_COLS: &str = "id, user_id, nudge_type, amount, message, reason, priority, status, \
                          created_at, responded_at, executed_at, expires_at, impact, metadata, \
                          feedback_rating, was_helpful, dismiss_reason, automated, dedupe_key";

impl Database {
    /// Insert a nudge, deduplicating on `dedupe_key` when present.
    ///
    /// A conflicting pending nudge is refreshed in place (message,
    /// amount, priority, metadata, expiry); a conflicting terminal nudge
    /// suppresses the new one and is returned unchanged. Without a key
    /// this is a plain insert.
    pub fn upsert_nudge(&self, new: &NewNudge) -> Result<NudgeAction> {
        let conn = self.conn()?;
        let metadata = serde_json::to_string(&new.metadata)?;

        match &new.dedupe_key {
            Some(key) => {
                conn.execute(
                    "INSERT INTO nudges \
                     (user_id, nudge_type, amount, message, reason, priority, expires_at, \
                      metadata, automated, dedupe_key) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
                     ON CONFLICT(dedupe_key) DO UPDATE SET \
                       amount = excluded.amount, \
                       message = excluded.message, \
                       reason = excluded.reason, \
                       priority = excluded.priority, \
                       expires_at = excluded.expires_at, \
                       metadata = excluded.metadata \
                     WHERE nudges.status = 'pending'",
                    params![
                        new.user_id,
                        new.nudge_type.as_str(),
                        new.amount.map(|a| a.minor()),
                        new.message,
                        new.reason,
                        new.priority,
                        fmt_datetime(new.expires_at),
                        metadata,
                        new.automated,
                        key,
                    ],
                )?;

                let nudge = conn.query_row(
                    &format!("SELECT {NUDGE_COLS} FROM nudges WHERE dedupe_key = ?"),
                    params![key],
                    row_to_nudge,
                )?;
                Ok(nudge)
            }
            None => {
                conn.execute(
                    "INSERT INTO nudges \
                     (user_id, nudge_type, amount, message, reason, priority, expires_at, \
                      metadata, automated) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        new.user_id,
                        new.nudge_type.as_str(),
                        new.amount.map(|a| a.minor()),
                        new.message,
                        new.reason,
                        new.priority,
                        fmt_datetime(new.expires_at),
                        metadata,
                        new.automated,
                    ],
                )?;

                let id = conn.last_insert_rowid();
                let nudge = conn.query_row(
                    &format!("SELECT {NUDGE_COLS} FROM nudges WHERE id = ?"),
                    params![id],
                    row_to_nudge,
                )?;
                Ok(nudge)
            }
        }
    }

    /// Get a nudge by ID, scoped to the owning user
    pub fn get_nudge(&self, user_id: i64, id: i64) -> Result<Option<NudgeAction>> {
        let conn = self.conn()?;
        let nudge = conn
            .query_row(
                &format!("SELECT {NUDGE_COLS} FROM nudges WHERE id = ? AND user_id = ?"),
                params![id, user_id],
                row_to_nudge,
            )
            .ok();

        Ok(nudge)
    }

    /// Look up a nudge by its dedupe key. Agents use this to tell a
    /// fresh run from one already settled inside the suppression window.
    pub fn find_nudge_by_dedupe_key(&self, key: &str) -> Result<Option<NudgeAction>> {
        let conn = self.conn()?;
        let nudge = conn
            .query_row(
                &format!("SELECT {NUDGE_COLS} FROM nudges WHERE dedupe_key = ?"),
                params![key],
                row_to_nudge,
            )
            .ok();

        Ok(nudge)
    }

    /// Pending nudges that have not passed their expiry, highest
    /// priority first. Expiry is applied at read time; the sweep only
    /// stamps statuses later.
    pub fn list_active_nudges(&self, user_id: i64, now: DateTime<Utc>) -> Result<Vec<NudgeAction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {NUDGE_COLS} FROM nudges \
             WHERE user_id = ? AND status = 'pending' AND expires_at > ? \
             ORDER BY priority DESC, created_at DESC"
        ))?;

        let nudges = stmt
            .query_map(params![user_id, fmt_datetime(now)], row_to_nudge)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(nudges)
    }

    /// Full nudge history, newest first
    pub fn list_nudge_history(&self, user_id: i64, limit: u32) -> Result<Vec<NudgeAction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {NUDGE_COLS} FROM nudges WHERE user_id = ? \
             ORDER BY created_at DESC LIMIT ?"
        ))?;

        let nudges = stmt
            .query_map(params![user_id, limit], row_to_nudge)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(nudges)
    }

    /// Most recent nudges of one type, newest first. Feeds the success
    /// predictor's sample window.
    pub fn list_nudges_by_type(
        &self,
        user_id: i64,
        nudge_type: NudgeType,
        limit: u32,
    ) -> Result<Vec<NudgeAction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {NUDGE_COLS} FROM nudges \
             WHERE user_id = ? AND nudge_type = ? \
             ORDER BY created_at DESC LIMIT ?"
        ))?;

        let nudges = stmt
            .query_map(params![user_id, nudge_type.as_str(), limit], row_to_nudge)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(nudges)
    }

    /// Nudges created in the window, for the rolling daily send cap
    pub fn count_nudges_since(&self, user_id: i64, since: DateTime<Utc>) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM nudges WHERE user_id = ? AND created_at >= ?",
            params![user_id, fmt_datetime(since)],
            |row| row.get(0),
        )?;

        Ok(count)
    }

    /// Sum of executed amounts of one type since a point in time, for
    /// autopilot daily/weekly spend caps
    pub fn executed_amount_since(
        &self,
        user_id: i64,
        nudge_type: NudgeType,
        since: DateTime<Utc>,
    ) -> Result<Money> {
        let conn = self.conn()?;
        let total: i64 = conn.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM nudges \
             WHERE user_id = ? AND nudge_type = ? AND status = 'executed' \
               AND executed_at >= ?",
            params![user_id, nudge_type.as_str(), fmt_datetime(since)],
            |row| row.get(0),
        )?;

        Ok(Money::from_minor(total))
    }

    /// Atomically transition a pending nudge to a terminal status.
    ///
    /// The executor runs inside the transition's SQLite transaction and
    /// returns the measured impact; if it errors, the whole transition
    /// rolls back and the nudge stays pending. A nudge that is missing
    /// returns `NotFound`; one already transitioned (including by a
    /// concurrent caller) returns `AlreadyProcessed`.
    pub fn transition_nudge<F>(
        &self,
        user_id: i64,
        nudge_id: i64,
        to: NudgeStatus,
        now: DateTime<Utc>,
        executor: F,
    ) -> Result<NudgeAction>
    where
        F: FnOnce(&rusqlite::Transaction<'_>, &NudgeAction) -> Result<Option<Money>>,
    {
        let mut conn = self.conn()?;
        // Immediate: take the write lock before reading the row, so two
        // racing transitions serialize here instead of at commit.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let nudge = tx
            .query_row(
                &format!("SELECT {NUDGE_COLS} FROM nudges WHERE id = ? AND user_id = ?"),
                params![nudge_id, user_id],
                row_to_nudge,
            )
            .map_err(|_| Error::NotFound(format!("nudge {}", nudge_id)))?;

        if nudge.status != NudgeStatus::Pending {
            return Err(Error::AlreadyProcessed(format!("nudge {}", nudge_id)));
        }

        let impact = executor(&tx, &nudge)?;

        let executed_at = (to == NudgeStatus::Executed).then_some(fmt_datetime(now));
        let updated = tx.execute(
            "UPDATE nudges SET status = ?, responded_at = ?, executed_at = ?, impact = ? \
             WHERE id = ? AND status = 'pending'",
            params![
                to.as_str(),
                fmt_datetime(now),
                executed_at,
                impact.map(|m| m.minor()),
                nudge_id,
            ],
        )?;
        if updated == 0 {
            return Err(Error::AlreadyProcessed(format!("nudge {}", nudge_id)));
        }

        let nudge = tx.query_row(
            &format!("SELECT {NUDGE_COLS} FROM nudges WHERE id = ?"),
            params![nudge_id],
            row_to_nudge,
        )?;

        tx.commit()?;
        Ok(nudge)
    }

    /// Stamp expired status on pending nudges past their deadline.
    /// Returns how many were swept.
    pub fn expire_overdue_nudges(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn()?;
        let swept = conn.execute(
            "UPDATE nudges SET status = 'expired', responded_at = ? \
             WHERE status = 'pending' AND expires_at <= ?",
            params![fmt_datetime(now), fmt_datetime(now)],
        )?;

        Ok(swept)
    }

    /// Attach user feedback to a nudge
    pub fn update_nudge_feedback(
        &self,
        user_id: i64,
        nudge_id: i64,
        rating: Option<i32>,
        was_helpful: Option<bool>,
        dismiss_reason: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE nudges SET \
               feedback_rating = COALESCE(?, feedback_rating), \
               was_helpful = COALESCE(?, was_helpful), \
               dismiss_reason = COALESCE(?, dismiss_reason) \
             WHERE id = ? AND user_id = ?",
            params![rating, was_helpful, dismiss_reason, nudge_id, user_id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("nudge {}", nudge_id)));
        }

        Ok(())
    }

    /// Status counts plus total executed impact, in one pass
    pub fn nudge_status_counts(&self, user_id: i64) -> Result<(i64, i64, i64, i64, Money)> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT \
               COUNT(*), \
               SUM(status = 'executed'), \
               SUM(status = 'rejected'), \
               SUM(status = 'expired'), \
               COALESCE(SUM(CASE WHEN status = 'executed' THEN impact END), 0) \
             FROM nudges WHERE user_id = ?",
            params![user_id],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get::<_, Option<i64>>(1)?.unwrap_or(0),
                    row.get::<_, Option<i64>>(2)?.unwrap_or(0),
                    row.get::<_, Option<i64>>(3)?.unwrap_or(0),
                    Money::from_minor(row.get(4)?),
                ))
            },
        )
        .map_err(Error::from)
    }

    /// Per-type (executed, responded) counts. Responded means executed
    /// or rejected; expired nudges are not treated as signal.
    pub fn nudge_type_outcomes(&self, user_id: i64) -> Result<Vec<(NudgeType, i64, i64)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT nudge_type, \
                    SUM(status = 'executed'), \
                    SUM(status IN ('executed', 'rejected')) \
             FROM nudges WHERE user_id = ? GROUP BY nudge_type",
        )?;

        let rows = stmt
            .query_map(params![user_id], |row| {
                let type_str: String = row.get(0)?;
                let executed: Option<i64> = row.get(1)?;
                let responded: Option<i64> = row.get(2)?;
                Ok((type_str, executed.unwrap_or(0), responded.unwrap_or(0)))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(s, e, r)| s.parse::<NudgeType>().ok().map(|t| (t, e, r)))
            .collect())
    }

    /// Nudges the user responded to, newest first. Feeds the optimal-
    /// hour recomputation.
    pub fn list_responded_nudges(&self, user_id: i64, limit: u32) -> Result<Vec<NudgeAction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {NUDGE_COLS} FROM nudges \
             WHERE user_id = ? AND status IN ('executed', 'rejected') \
             ORDER BY responded_at DESC LIMIT ?"
        ))?;

        let nudges = stmt
            .query_map(params![user_id, limit], row_to_nudge)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(nudges)
    }
}
