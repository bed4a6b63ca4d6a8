//! Risk snapshots and the agent safety lock

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use super::{fmt_datetime, parse_datetime, Database};
use crate::error::Result;
use crate::models::{AgentSafetyState, RiskLevel, RiskSnapshot};
use crate::risk::RiskAssessment;

fn row_to_snapshot(row: &Row<'_>) -> rusqlite::Result<RiskSnapshot> {
    let level_str: String = row.get(2)?;
    let drivers_str: String = row.get(4)?;
    let created_str: String = row.get(5)?;

    Ok(RiskSnapshot {
        id: row.get(0)?,
        user_id: row.get(1)?,
        risk_level: level_str.parse().unwrap_or(RiskLevel::Caution),
        risk_score: row.get::<_, i64>(3)?.clamp(0, 100) as u8,
        drivers: serde_json::from_str(&drivers_str).unwrap_or_default(),
        created_at: parse_datetime(&created_str),
    })
}

impl Database {
    /// Append a risk snapshot. Snapshots are never updated or deleted.
    pub fn insert_risk_snapshot(&self, user_id: i64, assessment: &RiskAssessment) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO risk_snapshots (user_id, risk_level, risk_score, drivers) \
             VALUES (?, ?, ?, ?)",
            params![
                user_id,
                assessment.level.as_str(),
                assessment.score as i64,
                serde_json::to_string(&assessment.drivers)?,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Recent risk snapshots, newest first
    pub fn list_risk_snapshots(&self, user_id: i64, limit: u32) -> Result<Vec<RiskSnapshot>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, risk_level, risk_score, drivers, created_at \
             FROM risk_snapshots WHERE user_id = ? \
             ORDER BY created_at DESC, id DESC LIMIT ?",
        )?;

        let snapshots = stmt
            .query_map(params![user_id, limit], row_to_snapshot)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(snapshots)
    }

    /// The watchdog lock state, defaulting to unlocked
    pub fn get_safety_state(&self, user_id: i64) -> Result<AgentSafetyState> {
        let conn = self.conn()?;
        let state = conn
            .query_row(
                "SELECT user_id, autopilot_locked, reason, locked_at \
                 FROM agent_safety WHERE user_id = ?",
                params![user_id],
                |row| {
                    let locked_str: Option<String> = row.get(3)?;
                    Ok(AgentSafetyState {
                        user_id: row.get(0)?,
                        autopilot_locked: row.get(1)?,
                        reason: row.get(2)?,
                        locked_at: locked_str.map(|s| parse_datetime(&s)),
                    })
                },
            )
            .ok();

        Ok(state.unwrap_or(AgentSafetyState {
            user_id,
            autopilot_locked: false,
            reason: None,
            locked_at: None,
        }))
    }

    /// Engage or release the autopilot lock
    pub fn set_autopilot_lock(
        &self,
        user_id: i64,
        locked: bool,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn()?;
        let locked_at = locked.then(|| fmt_datetime(now));
        conn.execute(
            "INSERT INTO agent_safety (user_id, autopilot_locked, reason, locked_at) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT(user_id) DO UPDATE SET \
               autopilot_locked = excluded.autopilot_locked, \
               reason = excluded.reason, \
               locked_at = excluded.locked_at",
            params![user_id, locked, reason, locked_at],
        )?;

        Ok(())
    }
}
