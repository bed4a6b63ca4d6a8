//! Savings goal operations

use chrono::NaiveDate;
use rusqlite::{params, Row};

use super::{parse_date, parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{Goal, GoalStatus};
use crate::money::Money;

fn row_to_goal(row: &Row<'_>) -> rusqlite::Result<Goal> {
    let date_str: String = row.get(5)?;
    let status_str: String = row.get(6)?;
    let created_str: String = row.get(7)?;

    Ok(Goal {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        target_amount: Money::from_minor(row.get(3)?),
        saved_amount: Money::from_minor(row.get(4)?),
        target_date: parse_date(&date_str).unwrap_or_default(),
        status: status_str.parse().unwrap_or(GoalStatus::Active),
        created_at: parse_datetime(&created_str),
    })
}

const GOAL_COLS: &str =
    "id, user_id, name, target_amount, saved_amount, target_date, status, created_at";

/// Add to a goal's saved amount inside an open transaction, marking it
/// completed if the target is reached.
pub(crate) fn add_to_goal_tx(
    tx: &rusqlite::Transaction<'_>,
    goal_id: i64,
    amount: Money,
) -> Result<()> {
    let updated = tx.execute(
        "UPDATE goals SET saved_amount = saved_amount + ? WHERE id = ? AND status = 'active'",
        params![amount.minor(), goal_id],
    )?;
    if updated == 0 {
        return Err(Error::NotFound(format!("active goal {}", goal_id)));
    }

    tx.execute(
        "UPDATE goals SET status = 'completed' \
         WHERE id = ? AND status = 'active' AND saved_amount >= target_amount",
        params![goal_id],
    )?;

    Ok(())
}

impl Database {
    pub fn create_goal(
        &self,
        user_id: i64,
        name: &str,
        target_amount: Money,
        target_date: NaiveDate,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO goals (user_id, name, target_amount, target_date) VALUES (?, ?, ?, ?)",
            params![user_id, name, target_amount.minor(), target_date.to_string()],
        )?;

        Ok(conn.last_insert_rowid())
    }

    pub fn get_goal(&self, user_id: i64, id: i64) -> Result<Option<Goal>> {
        let conn = self.conn()?;
        let goal = conn
            .query_row(
                &format!("SELECT {GOAL_COLS} FROM goals WHERE id = ? AND user_id = ?"),
                params![id, user_id],
                row_to_goal,
            )
            .ok();

        Ok(goal)
    }

    /// Active goals, nearest deadline first
    pub fn list_active_goals(&self, user_id: i64) -> Result<Vec<Goal>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {GOAL_COLS} FROM goals \
             WHERE user_id = ? AND status = 'active' ORDER BY target_date"
        ))?;

        let goals = stmt
            .query_map(params![user_id], row_to_goal)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(goals)
    }

    /// Standalone variant of the in-transaction goal contribution
    pub fn add_to_goal(&self, goal_id: i64, amount: Money) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        add_to_goal_tx(&tx, goal_id, amount)?;
        tx.commit()?;

        Ok(())
    }

    pub fn set_goal_status(&self, user_id: i64, goal_id: i64, status: GoalStatus) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE goals SET status = ? WHERE id = ? AND user_id = ?",
            params![status.as_str(), goal_id, user_id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("goal {}", goal_id)));
        }

        Ok(())
    }
}
