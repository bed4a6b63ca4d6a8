//! Budget operations

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use super::{fmt_datetime, parse_datetime, Database};
use crate::error::Result;
use crate::models::Budget;
use crate::money::Money;

fn row_to_budget(row: &Row<'_>) -> rusqlite::Result<Budget> {
    let alert_str: Option<String> = row.get(4)?;

    Ok(Budget {
        id: row.get(0)?,
        user_id: row.get(1)?,
        amount: Money::from_minor(row.get(2)?),
        is_locked: row.get(3)?,
        last_alert_sent: alert_str.map(|s| parse_datetime(&s)),
    })
}

impl Database {
    /// The user's active budget, if one is set
    pub fn get_budget(&self, user_id: i64) -> Result<Option<Budget>> {
        let conn = self.conn()?;
        let budget = conn
            .query_row(
                "SELECT id, user_id, amount, is_locked, last_alert_sent \
                 FROM budgets WHERE user_id = ?",
                params![user_id],
                row_to_budget,
            )
            .ok();

        Ok(budget)
    }

    /// Set or replace the user's budget amount. Lock state survives the
    /// update.
    pub fn upsert_budget(&self, user_id: i64, amount: Money) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO budgets (user_id, amount) VALUES (?, ?) \
             ON CONFLICT(user_id) DO UPDATE SET amount = excluded.amount",
            params![user_id, amount.minor()],
        )?;

        let id: i64 = conn.query_row(
            "SELECT id FROM budgets WHERE user_id = ?",
            params![user_id],
            |row| row.get(0),
        )?;

        Ok(id)
    }

    /// Flip the guardrail lock flag
    pub fn set_budget_locked(&self, user_id: i64, locked: bool) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE budgets SET is_locked = ? WHERE user_id = ?",
            params![locked, user_id],
        )?;

        Ok(())
    }

    /// Stamp the last budget-alert time, used to throttle repeat alerts
    pub fn set_budget_alert_sent(&self, user_id: i64, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE budgets SET last_alert_sent = ? WHERE user_id = ?",
            params![fmt_datetime(at), user_id],
        )?;

        Ok(())
    }
}
